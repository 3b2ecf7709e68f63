use crate::analyzer::Analyzer;
use crate::error::{Result, SearchError};
use crate::normalizer::Normalized;
use crate::persist::MetaFile;
use crate::store::DocumentStore;
use crate::tokenizer::tokenize;
use crate::{DocId, TermKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// term → ids of the documents containing it. Each id appears once per term.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Postings {
    map: BTreeMap<String, BTreeSet<DocId>>,
}

impl Postings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Postings of one granularity, derived from already scanned documents.
    pub fn from_documents(documents: &[DocumentTerms], kind: TermKind) -> Self {
        let mut postings = Self::new();
        for doc in documents {
            for term in doc.counts(kind).keys() {
                postings.insert(term, doc.doc_id);
            }
        }
        postings
    }

    pub fn insert(&mut self, term: &str, doc_id: DocId) {
        match self.map.get_mut(term) {
            Some(ids) => {
                ids.insert(doc_id);
            }
            None => {
                self.map.insert(term.to_string(), BTreeSet::from([doc_id]));
            }
        }
    }

    pub fn get(&self, term: &str) -> Option<&BTreeSet<DocId>> {
        self.map.get(term)
    }

    pub fn doc_frequency(&self, term: &str) -> usize {
        self.map.get(term).map_or(0, BTreeSet::len)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.map.contains_key(term)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<DocId>)> {
        self.map.iter().map(|(t, ids)| (t.as_str(), ids))
    }

    /// Every document id referenced by some term.
    pub fn doc_ids(&self) -> BTreeSet<DocId> {
        self.map.values().flatten().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Result of the single pass over one document: how many index terms it has
/// and how often each surface term and each lemma occurs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTerms {
    pub doc_id: DocId,
    /// Tokens that survived normalization and filtering.
    pub total: u32,
    pub surface: BTreeMap<String, u32>,
    pub lemma: BTreeMap<String, u32>,
}

impl DocumentTerms {
    pub fn counts(&self, kind: TermKind) -> &BTreeMap<String, u32> {
        match kind {
            TermKind::Surface => &self.surface,
            TermKind::Lemma => &self.lemma,
        }
    }
}

/// lemma → surface forms seen for it across the corpus.
pub type LemmaForms = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub doc_id: DocId,
    pub reason: String,
}

/// Documents scanned from a store, plus the ones that could not be read.
#[derive(Debug, Default)]
pub struct CorpusScan {
    pub documents: Vec<DocumentTerms>,
    pub skipped: Vec<SkippedDocument>,
    pub forms: LemmaForms,
}

impl CorpusScan {
    pub fn doc_ids(&self) -> Vec<DocId> {
        self.documents.iter().map(|d| d.doc_id).collect()
    }
}

#[derive(Debug)]
pub struct IndexBuild {
    pub surface: Postings,
    pub lemma: Postings,
    pub forms: LemmaForms,
    pub documents: Vec<DocumentTerms>,
    pub skipped: Vec<SkippedDocument>,
}

impl IndexBuild {
    pub fn postings(&self, kind: TermKind) -> &Postings {
        match kind {
            TermKind::Surface => &self.surface,
            TermKind::Lemma => &self.lemma,
        }
    }

    /// Manifest naming the exact documents this build covers.
    pub fn meta(&self) -> MetaFile {
        MetaFile::new(self.documents.iter().map(|d| d.doc_id).collect())
    }
}

#[derive(Debug, Clone)]
enum Lookup {
    Term(String),
    Filtered,
    Miss,
}

/// Builds the surface and lemma postings from a document store.
///
/// The normalizer is asked about each distinct surface form once per builder;
/// the first answer is kept for the rest of the build.
pub struct InvertedIndexBuilder {
    analyzer: Analyzer,
    cache: HashMap<String, Lookup>,
    misses: usize,
}

impl InvertedIndexBuilder {
    pub fn new(analyzer: Analyzer) -> Self {
        Self { analyzer, cache: HashMap::new(), misses: 0 }
    }

    pub fn build(&mut self, store: &dyn DocumentStore) -> Result<IndexBuild> {
        let scan = self.scan(store)?;
        let surface = Postings::from_documents(&scan.documents, TermKind::Surface);
        let lemma = Postings::from_documents(&scan.documents, TermKind::Lemma);
        tracing::info!(
            documents = scan.documents.len(),
            skipped = scan.skipped.len(),
            surface_terms = surface.len(),
            lemmas = lemma.len(),
            "built inverted index"
        );
        Ok(IndexBuild {
            surface,
            lemma,
            forms: scan.forms,
            documents: scan.documents,
            skipped: scan.skipped,
        })
    }

    /// Single pass over every document of the store. Unreadable documents
    /// are logged and reported in `skipped`.
    pub fn scan(&mut self, store: &dyn DocumentStore) -> Result<CorpusScan> {
        let listed = store.list_documents();
        let mut scan = CorpusScan::default();
        for doc_id in listed.iter().copied() {
            match store.read(doc_id) {
                Ok(text) => {
                    let terms = self.scan_document(doc_id, &text, &mut scan.forms);
                    scan.documents.push(terms);
                }
                Err(e) => {
                    tracing::warn!(doc_id, error = %e, "skipping unreadable document");
                    scan.skipped.push(SkippedDocument { doc_id, reason: e.to_string() });
                }
            }
        }
        if scan.documents.len() + scan.skipped.len() != store.len() {
            return Err(SearchError::CorpusInconsistency(format!(
                "store lists {} documents but {} were scanned and {} skipped",
                store.len(),
                scan.documents.len(),
                scan.skipped.len()
            )));
        }
        if self.misses > 0 {
            tracing::debug!(misses = self.misses, "tokens without normalization");
        }
        Ok(scan)
    }

    pub fn scan_document(
        &mut self,
        doc_id: DocId,
        text: &str,
        forms: &mut LemmaForms,
    ) -> DocumentTerms {
        let mut terms = DocumentTerms { doc_id, ..Default::default() };
        for surface in tokenize(text) {
            let lemma = match self.lookup(&surface) {
                Lookup::Term(lemma) => lemma,
                Lookup::Filtered | Lookup::Miss => continue,
            };
            terms.total += 1;
            *terms.lemma.entry(lemma.clone()).or_insert(0) += 1;
            forms.entry(lemma).or_default().insert(surface.clone());
            *terms.surface.entry(surface).or_insert(0) += 1;
        }
        terms
    }

    fn lookup(&mut self, surface: &str) -> Lookup {
        if let Some(found) = self.cache.get(surface) {
            return found.clone();
        }
        let found = match self.analyzer.classify(surface) {
            Ok(Some(Normalized { lemma, .. })) => Lookup::Term(lemma),
            Ok(None) => Lookup::Filtered,
            Err(e) => {
                tracing::debug!(error = %e, "normalization miss");
                self.misses += 1;
                Lookup::Miss
            }
        };
        self.cache.insert(surface.to_string(), found.clone());
        found
    }
}

//! TF-IDF weighting over a fixed vocabulary.
//!
//! `tf(t, d) = count(t in d) / indexed terms of d`, `idf(t) = ln(N / df(t))`
//! and `w(t, d) = tf × idf`. The same computation runs for surface terms and
//! for lemmas, each against its own postings and vocabulary.

use crate::error::{Result, SearchError};
use crate::index::{DocumentTerms, Postings};
use crate::{DocId, TermKind};
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Ordered, deduplicated terms defining the dimensions of every weight vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    terms: Vec<String>,
    positions: HashMap<String, usize>,
    fingerprint: Arc<str>,
}

impl Vocabulary {
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        terms.sort();
        terms.dedup();

        let mut hasher = Sha1::new();
        for t in &terms {
            hasher.update(t.as_bytes());
            hasher.update(b"\n");
        }
        let fingerprint: Arc<str> = format!("{:x}", hasher.finalize()).into();
        let positions = terms.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        Self { terms, positions, fingerprint }
    }

    pub fn from_postings(postings: &Postings) -> Self {
        Self::from_terms(postings.terms())
    }

    pub fn position(&self, term: &str) -> Option<usize> {
        self.positions.get(term).copied()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Identifies this exact term list; vectors are only comparable when
    /// their fingerprints match.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Dense vector with `weights` placed at their term positions. Terms
    /// outside the vocabulary are dropped.
    pub fn vectorize<'a>(&self, weights: impl IntoIterator<Item = (&'a str, f64)>) -> WeightVector {
        let mut values = vec![0.0; self.terms.len()];
        for (term, w) in weights {
            if let Some(i) = self.position(term) {
                values[i] = w;
            }
        }
        WeightVector { fingerprint: self.fingerprint.clone(), values }
    }
}

/// One weight per vocabulary position; absent terms weigh 0.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    fingerprint: Arc<str>,
    values: Vec<f64>,
}

/// How a query vector is compared to a document vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Similarity {
    /// `Σ qᵢdᵢ / (‖q‖·‖d‖)` with Euclidean norms.
    #[default]
    Cosine,
    /// `Σ qᵢdᵢ / (sqrt(Σ qᵢ)·sqrt(Σ dᵢ))`, the normalizer used by the older
    /// tooling. Only for reproducing its scores.
    ReferenceSum,
}

impl std::str::FromStr for Similarity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Similarity::Cosine),
            "reference-sum" => Ok(Similarity::ReferenceSum),
            other => Err(format!("unknown similarity {other:?}")),
        }
    }
}

impl WeightVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    fn check_comparable(&self, other: &WeightVector) -> Result<()> {
        if self.fingerprint != other.fingerprint || self.values.len() != other.values.len() {
            return Err(SearchError::VectorDimensionMismatch {
                expected: format!("{} ({} terms)", self.fingerprint, self.values.len()),
                found: format!("{} ({} terms)", other.fingerprint, other.values.len()),
            });
        }
        Ok(())
    }

    pub fn dot(&self, other: &WeightVector) -> Result<f64> {
        self.check_comparable(other)?;
        Ok(self.values.iter().zip(&other.values).map(|(a, b)| a * b).sum())
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Similarity in `[0, 1]` for non-negative weights. A zero norm on
    /// either side yields 0.
    pub fn similarity(&self, other: &WeightVector, measure: Similarity) -> Result<f64> {
        let dot = self.dot(other)?;
        let denom = match measure {
            Similarity::Cosine => self.norm() * other.norm(),
            Similarity::ReferenceSum => {
                let sum = |v: &[f64]| v.iter().sum::<f64>().sqrt();
                sum(&self.values) * sum(&other.values)
            }
        };
        if denom == 0.0 || !denom.is_finite() {
            return Ok(0.0);
        }
        Ok(dot / denom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TfIdfRecord {
    pub term: String,
    pub idf: f64,
    pub tf_idf: f64,
}

#[derive(Debug, Clone)]
pub struct TfIdfTable {
    pub kind: TermKind,
    pub vocabulary: Vocabulary,
    /// idf by vocabulary position.
    pub idf: Vec<f64>,
    /// Records of every document in the corpus, sorted by term. Documents
    /// without index terms have an empty list.
    pub documents: BTreeMap<DocId, Vec<TfIdfRecord>>,
}

impl TfIdfTable {
    pub fn corpus_size(&self) -> usize {
        self.documents.len()
    }

    pub fn idf_of(&self, term: &str) -> Option<f64> {
        self.vocabulary.position(term).map(|i| self.idf[i])
    }

    pub fn records(&self, doc_id: DocId) -> Option<&[TfIdfRecord]> {
        self.documents.get(&doc_id).map(Vec::as_slice)
    }

    pub fn vector(&self, doc_id: DocId) -> Option<WeightVector> {
        let records = self.documents.get(&doc_id)?;
        Some(self.vocabulary.vectorize(records.iter().map(|r| (r.term.as_str(), r.tf_idf))))
    }

    /// Dense vectors for every document, computed once per snapshot.
    pub fn vectors(&self) -> BTreeMap<DocId, WeightVector> {
        self.documents
            .iter()
            .map(|(id, records)| {
                let weights = records.iter().map(|r| (r.term.as_str(), r.tf_idf));
                (*id, self.vocabulary.vectorize(weights))
            })
            .collect()
    }

    /// Rebuild a table from its persisted parts: the vocabulary with idf
    /// values and the per-document records. Records must use the same
    /// vocabulary and idf values, otherwise the artifacts are from
    /// different builds.
    pub fn assemble(
        kind: TermKind,
        idf_table: Vec<(String, f64)>,
        documents: BTreeMap<DocId, Vec<TfIdfRecord>>,
    ) -> Result<Self> {
        let vocabulary = Vocabulary::from_terms(idf_table.iter().map(|(t, _)| t.as_str()));
        if vocabulary.len() != idf_table.len() {
            return Err(SearchError::CorpusInconsistency(format!(
                "{kind} idf table lists duplicate terms"
            )));
        }
        let mut idf = vec![0.0; vocabulary.len()];
        for (term, value) in &idf_table {
            if let Some(i) = vocabulary.position(term) {
                idf[i] = *value;
            }
        }
        for (doc_id, records) in &documents {
            for r in records {
                let matches = vocabulary.position(&r.term).map(|i| idf[i] == r.idf);
                match matches {
                    Some(true) => {}
                    Some(false) => {
                        return Err(SearchError::CorpusInconsistency(format!(
                            "document {doc_id}: idf of {:?} differs from the {kind} idf table",
                            r.term
                        )))
                    }
                    None => {
                        return Err(SearchError::VectorDimensionMismatch {
                            expected: vocabulary.fingerprint().to_string(),
                            found: format!(
                                "document {doc_id} term {:?} outside the vocabulary",
                                r.term
                            ),
                        })
                    }
                }
            }
        }
        Ok(Self { kind, vocabulary, idf, documents })
    }
}

/// Compute weights for every scanned document against `postings`.
///
/// `documents` must be exactly the corpus the postings were built from:
/// a posting naming an unknown document, or a document term without
/// postings, is a `CorpusInconsistency`.
pub fn compute(
    documents: &[DocumentTerms],
    postings: &Postings,
    kind: TermKind,
) -> Result<TfIdfTable> {
    let n = documents.len();
    let known: BTreeMap<DocId, &DocumentTerms> = documents.iter().map(|d| (d.doc_id, d)).collect();
    if known.len() != n {
        return Err(SearchError::CorpusInconsistency("duplicate document ids in corpus".into()));
    }
    if let Some(missing) = postings.doc_ids().into_iter().find(|id| !known.contains_key(id)) {
        return Err(SearchError::CorpusInconsistency(format!(
            "{kind} postings reference document {missing} which is not in the corpus"
        )));
    }

    let vocabulary = Vocabulary::from_postings(postings);
    let idf: Vec<f64> = vocabulary
        .terms()
        .iter()
        .map(|t| (n as f64 / postings.doc_frequency(t) as f64).ln())
        .collect();

    let mut table = BTreeMap::new();
    for doc in documents {
        let counts = doc.counts(kind);
        let mut records = Vec::with_capacity(counts.len());
        for (term, count) in counts {
            let Some(i) = vocabulary.position(term) else {
                return Err(SearchError::CorpusInconsistency(format!(
                    "document {} contains {kind} term {term:?} missing from the postings",
                    doc.doc_id
                )));
            };
            let tf = *count as f64 / doc.total as f64;
            records.push(TfIdfRecord { term: term.clone(), idf: idf[i], tf_idf: tf * idf[i] });
        }
        table.insert(doc.doc_id, records);
    }

    tracing::info!(%kind, documents = n, terms = vocabulary.len(), "computed tf-idf");
    Ok(TfIdfTable { kind, vocabulary, idf, documents: table })
}

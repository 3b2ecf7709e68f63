use crate::analyzer::Analyzer;
use crate::error::{Result, SearchError};
use crate::index::Postings;
use crate::tfidf::{Similarity, TfIdfTable, WeightVector};
use crate::DocId;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// Ranks documents by similarity between the query's weight vector and the
/// cached document vectors. Only documents sharing at least one lemma with
/// the query are scored.
pub struct VectorSpaceRetriever<'a> {
    postings: &'a Postings,
    table: &'a TfIdfTable,
    vectors: &'a BTreeMap<DocId, WeightVector>,
    similarity: Similarity,
}

impl<'a> VectorSpaceRetriever<'a> {
    pub fn new(
        postings: &'a Postings,
        table: &'a TfIdfTable,
        vectors: &'a BTreeMap<DocId, WeightVector>,
    ) -> Self {
        Self { postings, table, vectors, similarity: Similarity::default() }
    }

    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn search(&self, analyzer: &Analyzer, query: &str) -> Result<Vec<ScoredDoc>> {
        let lemmas: Vec<String> = analyzer.analyze(query).into_iter().map(|t| t.lemma).collect();
        self.rank(&lemmas)
    }

    /// Rank against already normalized query lemmas (repeats count).
    pub fn rank(&self, lemmas: &[String]) -> Result<Vec<ScoredDoc>> {
        if lemmas.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let query = self.query_vector(lemmas);

        let candidates: BTreeSet<DocId> = lemmas
            .iter()
            .filter_map(|l| self.postings.get(l))
            .flatten()
            .copied()
            .collect();

        let mut scored = Vec::with_capacity(candidates.len());
        for doc_id in candidates {
            let doc = self.vectors.get(&doc_id).ok_or_else(|| {
                SearchError::CorpusInconsistency(format!(
                    "document {doc_id} has postings but no weight vector"
                ))
            })?;
            let score = query.similarity(doc, self.similarity)?;
            scored.push(ScoredDoc { doc_id, score });
        }
        scored.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(a.doc_id.cmp(&b.doc_id))
        });
        Ok(scored)
    }

    /// Query weights over the corpus vocabulary: `tf` over the query lemmas
    /// times the corpus idf. Lemmas unknown to the corpus add nothing.
    pub fn query_vector(&self, lemmas: &[String]) -> WeightVector {
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for l in lemmas {
            *counts.entry(l.as_str()).or_insert(0) += 1;
        }
        let total = lemmas.len() as f64;
        let weights = counts.into_iter().filter_map(|(term, count)| {
            let idf = self.table.idf_of(term)?;
            Some((term, count as f64 / total * idf))
        });
        self.table.vocabulary.vectorize(weights)
    }
}

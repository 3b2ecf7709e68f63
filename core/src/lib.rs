//! Full-text retrieval over a crawled corpus: lemma and surface-form
//! inverted indices, TF-IDF weights, boolean set queries and ranked
//! vector-space queries.

pub mod analyzer;
pub mod boolean;
pub mod config;
pub mod error;
pub mod index;
pub mod normalizer;
pub mod persist;
pub mod pipeline;
pub mod snapshot;
pub mod store;
pub mod tfidf;
pub mod tokenizer;
pub mod vector;

use std::fmt;
use std::str::FromStr;

pub use analyzer::{AnalyzedTerm, Analyzer};
pub use boolean::{BooleanOp, BooleanQuery, BooleanRetriever};
pub use error::{Result, SearchError};
pub use index::{DocumentTerms, IndexBuild, InvertedIndexBuilder, LemmaForms, Postings};
pub use snapshot::{SearchSnapshot, SnapshotHandle};
pub use store::{Document, DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use tfidf::{Similarity, TfIdfRecord, TfIdfTable, Vocabulary, WeightVector};
pub use vector::{ScoredDoc, VectorSpaceRetriever};

pub type DocId = u32;

/// Granularity of an index term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// Lowercased token as it appeared in the text.
    Surface,
    /// Dictionary form produced by the normalizer.
    Lemma,
}

impl TermKind {
    pub const ALL: [TermKind; 2] = [TermKind::Surface, TermKind::Lemma];
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TermKind::Surface => "surface",
            TermKind::Lemma => "lemma",
        })
    }
}

impl FromStr for TermKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "surface" | "word" | "words" => Ok(TermKind::Surface),
            "lemma" | "lemmas" => Ok(TermKind::Lemma),
            other => Err(format!("unknown term kind {other:?}")),
        }
    }
}

//! Paths and tuning values handed explicitly to every pipeline stage.

use crate::normalizer::{Language, PosFilter};
use crate::TermKind;
use std::path::{Path, PathBuf};

/// Bumped whenever the on-disk artifact layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Default number of ranked hits returned to interactive callers.
pub const DEFAULT_TOP_K: usize = 10;

/// Upper bound on `k` accepted from callers.
pub const MAX_TOP_K: usize = 100;

/// Where the crawled corpus lives: one `{id}.txt` per document plus the
/// `id: url` document index.
#[derive(Debug, Clone)]
pub struct CorpusPaths {
    pub dir: PathBuf,
    pub doc_index: PathBuf,
}

impl CorpusPaths {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(dir: P, doc_index: Q) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), doc_index: doc_index.as_ref().to_path_buf() }
    }

    pub fn document(&self, id: crate::DocId) -> PathBuf {
        self.dir.join(format!("{id}.txt"))
    }
}

/// Root directory of the index artifacts and the names of the files in it.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

pub(crate) const META: &str = "meta.json";
pub(crate) const LEMMA_FORMS: &str = "lemma_forms.txt";

pub(crate) fn postings_artifact(kind: TermKind) -> &'static str {
    match kind {
        TermKind::Surface => "surface_index.txt",
        TermKind::Lemma => "lemma_index.txt",
    }
}

pub(crate) fn idf_artifact(kind: TermKind) -> &'static str {
    match kind {
        TermKind::Surface => "surface_idf.txt",
        TermKind::Lemma => "lemma_idf.txt",
    }
}

pub(crate) fn weights_group(kind: TermKind) -> &'static str {
    match kind {
        TermKind::Surface => "tfidf_surface",
        TermKind::Lemma => "tfidf_lemma",
    }
}

/// How query and document text is turned into lemmas.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub language: Language,
    /// Morphological dictionary (`surface lemma pos` lines). When absent the
    /// stemming normalizer is used on its own.
    pub dictionary: Option<PathBuf>,
    pub filter: PosFilter,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { language: Language::Russian, dictionary: None, filter: PosFilter::default() }
    }
}

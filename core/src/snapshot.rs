use crate::analyzer::Analyzer;
use crate::boolean::BooleanRetriever;
use crate::error::{Result, SearchError};
use crate::index::{LemmaForms, Postings};
use crate::persist::{self, ArtifactStore, MetaFile};
use crate::store::DocumentStore;
use crate::tfidf::{Similarity, TfIdfTable, Vocabulary, WeightVector};
use crate::vector::{ScoredDoc, VectorSpaceRetriever};
use crate::{DocId, TermKind};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Everything a query needs, loaded once and never mutated.
pub struct SearchSnapshot {
    pub meta: MetaFile,
    pub postings: Postings,
    pub table: TfIdfTable,
    pub forms: LemmaForms,
    urls: BTreeMap<DocId, String>,
    vectors: BTreeMap<DocId, WeightVector>,
}

impl SearchSnapshot {
    /// Assemble a snapshot, rejecting parts that come from different builds.
    /// Urls are attached separately with [`SearchSnapshot::with_urls`].
    pub fn new(
        meta: MetaFile,
        postings: Postings,
        table: TfIdfTable,
        forms: LemmaForms,
    ) -> Result<Self> {
        let expected = Vocabulary::from_postings(&postings);
        if expected.fingerprint() != table.vocabulary.fingerprint() {
            return Err(SearchError::VectorDimensionMismatch {
                expected: format!("{} ({} terms)", expected.fingerprint(), expected.len()),
                found: format!(
                    "{} ({} terms)",
                    table.vocabulary.fingerprint(),
                    table.vocabulary.len()
                ),
            });
        }
        let weighted: Vec<DocId> = table.documents.keys().copied().collect();
        if weighted != meta.doc_ids {
            return Err(SearchError::CorpusInconsistency(format!(
                "weights cover {} documents but the index manifest lists {}",
                weighted.len(),
                meta.doc_ids.len()
            )));
        }
        let vectors = table.vectors();
        Ok(Self { meta, postings, table, forms, urls: BTreeMap::new(), vectors })
    }

    /// Attach the source url of every indexed document found in `docs`.
    pub fn with_urls(mut self, docs: &dyn DocumentStore) -> Self {
        self.urls = self
            .meta
            .doc_ids
            .iter()
            .filter_map(|&id| docs.url_of(id).map(|url| (id, url.to_string())))
            .collect();
        let unresolved = self.meta.doc_ids.len() - self.urls.len();
        if unresolved > 0 {
            tracing::warn!(unresolved, "indexed documents missing from the document index");
        }
        self
    }

    /// Load the lemma index from `store` and resolve urls through `docs`.
    pub fn load(store: &dyn ArtifactStore, docs: &dyn DocumentStore) -> Result<Self> {
        let meta = persist::load_meta(store)?;
        let postings = persist::load_postings(store, TermKind::Lemma)?;
        let table = persist::load_table(store, TermKind::Lemma)?;
        let forms = persist::load_forms(store)?;
        let snapshot = Self::new(meta, postings, table, forms)?.with_urls(docs);
        tracing::info!(
            documents = snapshot.meta.num_docs,
            lemmas = snapshot.table.vocabulary.len(),
            urls = snapshot.urls.len(),
            "loaded search snapshot"
        );
        Ok(snapshot)
    }

    /// Url of an indexed document, as recorded when this snapshot was loaded.
    pub fn url_of(&self, id: DocId) -> Option<&str> {
        self.urls.get(&id).map(String::as_str)
    }

    pub fn vector_search(
        &self,
        analyzer: &Analyzer,
        query: &str,
        similarity: Similarity,
    ) -> Result<Vec<ScoredDoc>> {
        VectorSpaceRetriever::new(&self.postings, &self.table, &self.vectors)
            .with_similarity(similarity)
            .search(analyzer, query)
    }

    pub fn boolean_search(&self, analyzer: &Analyzer, query: &str) -> Result<BTreeSet<DocId>> {
        BooleanRetriever::new(&self.postings).search(analyzer, query)
    }
}

/// Shared pointer to the current snapshot. Readers take a clone of the inner
/// `Arc` and keep using it even if a newer snapshot is installed meanwhile.
#[derive(Clone)]
pub struct SnapshotHandle {
    current: Arc<RwLock<Arc<SearchSnapshot>>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: SearchSnapshot) -> Self {
        Self { current: Arc::new(RwLock::new(Arc::new(snapshot))) }
    }

    pub fn current(&self) -> Arc<SearchSnapshot> {
        self.current.read().clone()
    }

    /// Install a fully built snapshot; returns the one it replaced.
    pub fn replace(&self, snapshot: SearchSnapshot) -> Arc<SearchSnapshot> {
        std::mem::replace(&mut *self.current.write(), Arc::new(snapshot))
    }

    /// Load a new snapshot, urls included, and swap it in with a single
    /// pointer write. On failure the current snapshot stays installed.
    pub fn reload(
        &self,
        store: &dyn ArtifactStore,
        docs: &dyn DocumentStore,
    ) -> Result<Arc<SearchSnapshot>> {
        let fresh = Arc::new(SearchSnapshot::load(store, docs)?);
        *self.current.write() = fresh.clone();
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{DictionaryNormalizer, PartOfSpeech, PosFilter};
    use crate::persist::MemoryArtifactStore;
    use crate::pipeline;
    use crate::store::{Document, MemoryDocumentStore};

    fn analyzer() -> Analyzer {
        let dict = DictionaryNormalizer::from_entries([
            ("кот", "кот", PartOfSpeech::Noun),
            ("сидит", "сидеть", PartOfSpeech::Verb),
            ("собака", "собака", PartOfSpeech::Noun),
        ]);
        Analyzer::new(Arc::new(dict), PosFilter::default())
    }

    #[test]
    fn readers_keep_their_snapshot_across_a_swap() {
        let artifacts = MemoryArtifactStore::new();
        let a = analyzer();
        let docs = MemoryDocumentStore::from_texts(["кот сидит", "собака"]);
        pipeline::run_build(&docs, &a, &artifacts).unwrap();
        let handle = SnapshotHandle::new(SearchSnapshot::load(&artifacts, &docs).unwrap());
        let before = handle.current();

        let docs = MemoryDocumentStore::from_texts(["собака"]);
        pipeline::run_build(&docs, &a, &artifacts).unwrap();
        handle.reload(&artifacts, &docs).unwrap();

        assert_eq!(before.meta.num_docs, 2);
        assert_eq!(handle.current().meta.num_docs, 1);
        assert!(before.vector_search(&a, "кот", Similarity::Cosine).unwrap().len() == 1);
        assert!(handle.current().vector_search(&a, "кот", Similarity::Cosine).unwrap().is_empty());
    }

    #[test]
    fn urls_are_swapped_together_with_the_index() {
        let artifacts = MemoryArtifactStore::new();
        let a = analyzer();
        let mut docs = MemoryDocumentStore::new();
        docs.insert(Document { id: 0, url: "http://old.example/0".into(), text: "кот".into() });
        docs.insert(Document { id: 1, url: "http://old.example/1".into(), text: "собака".into() });
        pipeline::run_build(&docs, &a, &artifacts).unwrap();
        let handle = SnapshotHandle::new(SearchSnapshot::load(&artifacts, &docs).unwrap());
        let before = handle.current();

        // Same ids, new documents behind them.
        let mut docs = MemoryDocumentStore::new();
        docs.insert(Document { id: 0, url: "http://new.example/0".into(), text: "собака".into() });
        docs.insert(Document {
            id: 1,
            url: "http://new.example/1".into(),
            text: "кот сидит".into(),
        });
        pipeline::run_build(&docs, &a, &artifacts).unwrap();
        let after = handle.reload(&artifacts, &docs).unwrap();

        let hit = before.vector_search(&a, "кот", Similarity::Cosine).unwrap()[0].doc_id;
        assert_eq!(before.url_of(hit), Some("http://old.example/0"));
        let hit = after.vector_search(&a, "кот", Similarity::Cosine).unwrap()[0].doc_id;
        assert_eq!(after.url_of(hit), Some("http://new.example/1"));
        assert_eq!(after.url_of(7), None);
    }

    #[test]
    fn documents_missing_from_the_url_source_have_no_url() {
        let artifacts = MemoryArtifactStore::new();
        let a = analyzer();
        let indexed = MemoryDocumentStore::from_texts(["кот", "собака"]);
        pipeline::run_build(&indexed, &a, &artifacts).unwrap();
        let listed = MemoryDocumentStore::from_texts(["кот"]);
        let snapshot = SearchSnapshot::load(&artifacts, &listed).unwrap();
        assert_eq!(snapshot.url_of(0), Some("memory://0"));
        assert_eq!(snapshot.url_of(1), None);
    }

    #[test]
    fn failed_reload_keeps_the_old_snapshot() {
        let artifacts = MemoryArtifactStore::new();
        let a = analyzer();
        let docs = MemoryDocumentStore::from_texts(["кот сидит"]);
        pipeline::run_build(&docs, &a, &artifacts).unwrap();
        let handle = SnapshotHandle::new(SearchSnapshot::load(&artifacts, &docs).unwrap());

        let empty = MemoryArtifactStore::new();
        assert!(handle.reload(&empty, &docs).is_err());
        assert_eq!(handle.current().meta.num_docs, 1);
        assert_eq!(handle.current().url_of(0), Some("memory://0"));
    }

    #[test]
    fn stale_weights_are_rejected() {
        let artifacts = MemoryArtifactStore::new();
        let a = analyzer();
        let docs = MemoryDocumentStore::from_texts(["кот сидит", "собака"]);
        pipeline::run_build(&docs, &a, &artifacts).unwrap();
        // A re-index without recomputing weights leaves the weights stale.
        let shrunk = MemoryDocumentStore::from_texts(["кот"]);
        pipeline::run_index_stage(&shrunk, &a, &artifacts).unwrap();
        let err = SearchSnapshot::load(&artifacts, &docs).err().unwrap();
        assert!(matches!(err, SearchError::VectorDimensionMismatch { .. }));
    }
}

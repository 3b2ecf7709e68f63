//! Read-only access to the crawled corpus.

use crate::config::CorpusPaths;
use crate::error::{Result, SearchError};
use crate::persist::decode_doc_index;
use crate::DocId;
use std::collections::BTreeMap;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocId,
    pub url: String,
    pub text: String,
}

pub trait DocumentStore {
    /// Ids of every document in the corpus, ascending.
    fn list_documents(&self) -> Vec<DocId>;

    fn read(&self, id: DocId) -> Result<String>;

    fn url_of(&self, id: DocId) -> Option<&str>;

    fn len(&self) -> usize {
        self.list_documents().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Corpus directory of `{id}.txt` files described by an `id: url` index file.
pub struct FsDocumentStore {
    paths: CorpusPaths,
    urls: BTreeMap<DocId, String>,
}

impl FsDocumentStore {
    pub fn open(paths: CorpusPaths) -> Result<Self> {
        let contents = std::fs::read_to_string(&paths.doc_index)
            .map_err(|e| SearchError::io(&paths.doc_index, e))?;
        let urls = decode_doc_index(&paths.doc_index.display().to_string(), &contents)?;

        let on_disk = WalkDir::new(&paths.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
            .count();
        if on_disk != urls.len() {
            tracing::warn!(
                indexed = urls.len(),
                on_disk,
                dir = %paths.dir.display(),
                "document index and corpus directory disagree"
            );
        }
        Ok(Self { paths, urls })
    }

    pub fn paths(&self) -> &CorpusPaths {
        &self.paths
    }
}

impl DocumentStore for FsDocumentStore {
    fn list_documents(&self) -> Vec<DocId> {
        self.urls.keys().copied().collect()
    }

    fn read(&self, id: DocId) -> Result<String> {
        if !self.urls.contains_key(&id) {
            return Err(SearchError::MissingDocument(id));
        }
        read_document(&self.paths, id)
    }

    fn url_of(&self, id: DocId) -> Option<&str> {
        self.urls.get(&id).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.urls.len()
    }
}

/// Text of `{id}.txt` under the corpus directory, without consulting the
/// document index.
pub fn read_document(paths: &CorpusPaths, id: DocId) -> Result<String> {
    let path = paths.document(id);
    std::fs::read_to_string(&path).map_err(|e| SearchError::io(path, e))
}

#[derive(Debug, Default, Clone)]
pub struct MemoryDocumentStore {
    docs: BTreeMap<DocId, Document>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from plain texts; ids are assigned from 0 in order.
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut store = Self::new();
        for (id, text) in texts.into_iter().enumerate() {
            let id = id as DocId;
            store.insert(Document { id, url: format!("memory://{id}"), text: text.to_string() });
        }
        store
    }

    pub fn insert(&mut self, doc: Document) {
        self.docs.insert(doc.id, doc);
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn list_documents(&self) -> Vec<DocId> {
        self.docs.keys().copied().collect()
    }

    fn read(&self, id: DocId) -> Result<String> {
        self.docs.get(&id).map(|d| d.text.clone()).ok_or(SearchError::MissingDocument(id))
    }

    fn url_of(&self, id: DocId) -> Option<&str> {
        self.docs.get(&id).map(|d| d.url.as_str())
    }

    fn len(&self) -> usize {
        self.docs.len()
    }
}

//! Line-oriented text artifacts and the stores that hold them.
//!
//! Formats, one record per line, space separated:
//! - postings: `term id₁ id₂ … idₙ`
//! - lemma forms: `lemma form₁ … formₙ`
//! - vocabulary with idf: `term idf`
//! - weight records (one artifact per document): `term idf tf_idf`
//! - document index: `id: url`
//!
//! Terms are written in sorted order and ids ascending, so encoding the same
//! data twice gives identical bytes. Every save replaces the previous
//! artifact as a whole.

use crate::config::{self, IndexPaths, FORMAT_VERSION};
use crate::error::{Result, SearchError};
use crate::index::{LemmaForms, Postings};
use crate::tfidf::{TfIdfRecord, TfIdfTable};
use crate::{DocId, TermKind};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub num_docs: u32,
    /// Documents the postings were built from, ascending.
    pub doc_ids: Vec<DocId>,
}

impl MetaFile {
    pub fn new(mut doc_ids: Vec<DocId>) -> Self {
        doc_ids.sort_unstable();
        Self { version: FORMAT_VERSION, num_docs: doc_ids.len() as u32, doc_ids }
    }
}

// ---------- codec ----------

pub fn encode_postings(postings: &Postings) -> String {
    let mut out = String::new();
    for (term, ids) in postings.iter() {
        out.push_str(term);
        for id in ids {
            let _ = write!(out, " {id}");
        }
        out.push('\n');
    }
    out
}

pub fn decode_postings(artifact: &str, contents: &str) -> Result<Postings> {
    let mut postings = Postings::new();
    for (n, line) in records(contents) {
        let mut fields = line.split_whitespace();
        let term = fields.next().unwrap_or_default();
        let mut any = false;
        for field in fields {
            let id: DocId = field.parse().map_err(|_| {
                SearchError::parse(artifact, n, format!("bad document id {field:?}"))
            })?;
            postings.insert(term, id);
            any = true;
        }
        if !any {
            return Err(SearchError::parse(artifact, n, format!("term {term:?} has no documents")));
        }
    }
    Ok(postings)
}

pub fn encode_forms(forms: &LemmaForms) -> String {
    let mut out = String::new();
    for (lemma, surfaces) in forms {
        out.push_str(lemma);
        for s in surfaces {
            out.push(' ');
            out.push_str(s);
        }
        out.push('\n');
    }
    out
}

pub fn decode_forms(artifact: &str, contents: &str) -> Result<LemmaForms> {
    let mut forms = LemmaForms::new();
    for (n, line) in records(contents) {
        let mut fields = line.split_whitespace();
        let lemma = fields.next().unwrap_or_default().to_string();
        let surfaces: BTreeSet<String> = fields.map(str::to_string).collect();
        if surfaces.is_empty() {
            return Err(SearchError::parse(artifact, n, format!("lemma {lemma:?} has no forms")));
        }
        forms.insert(lemma, surfaces);
    }
    Ok(forms)
}

pub fn encode_idf(table: &TfIdfTable) -> String {
    let mut out = String::new();
    for (term, idf) in table.vocabulary.terms().iter().zip(&table.idf) {
        let _ = writeln!(out, "{term} {idf}");
    }
    out
}

pub fn decode_idf(artifact: &str, contents: &str) -> Result<Vec<(String, f64)>> {
    records(contents)
        .map(|(n, line)| match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [term, idf] => Ok((term.to_string(), parse_f64(artifact, n, idf)?)),
            _ => Err(SearchError::parse(artifact, n, "expected `term idf`")),
        })
        .collect()
}

pub fn encode_weight_records(records: &[TfIdfRecord]) -> String {
    let mut out = String::new();
    for r in records {
        let _ = writeln!(out, "{} {} {}", r.term, r.idf, r.tf_idf);
    }
    out
}

pub fn decode_weight_records(artifact: &str, contents: &str) -> Result<Vec<TfIdfRecord>> {
    records(contents)
        .map(|(n, line)| match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [term, idf, tf_idf] => Ok(TfIdfRecord {
                term: term.to_string(),
                idf: parse_f64(artifact, n, idf)?,
                tf_idf: parse_f64(artifact, n, tf_idf)?,
            }),
            _ => Err(SearchError::parse(artifact, n, "expected `term idf tf_idf`")),
        })
        .collect()
}

pub fn encode_doc_index(urls: &BTreeMap<DocId, String>) -> String {
    let mut out = String::new();
    for (id, url) in urls {
        let _ = writeln!(out, "{id}: {url}");
    }
    out
}

pub fn decode_doc_index(artifact: &str, contents: &str) -> Result<BTreeMap<DocId, String>> {
    let mut urls = BTreeMap::new();
    for (n, line) in records(contents) {
        let (id, url) = line
            .split_once(':')
            .ok_or_else(|| SearchError::parse(artifact, n, "expected `id: url`"))?;
        let id: DocId = id
            .trim()
            .parse()
            .map_err(|_| SearchError::parse(artifact, n, format!("bad document id {id:?}")))?;
        if urls.insert(id, url.trim().to_string()).is_some() {
            return Err(SearchError::parse(artifact, n, format!("document {id} listed twice")));
        }
    }
    Ok(urls)
}

/// Non-blank lines with 1-based line numbers.
fn records(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
}

fn parse_f64(artifact: &str, line: usize, field: &str) -> Result<f64> {
    field
        .parse()
        .map_err(|_| SearchError::parse(artifact, line, format!("bad number {field:?}")))
}

// ---------- stores ----------

/// Named text artifacts. Groups hold one artifact per document and are
/// always replaced together.
pub trait ArtifactStore: Send + Sync {
    fn write(&self, name: &str, contents: &str) -> Result<()>;

    fn read(&self, name: &str) -> Result<String>;

    fn write_group(&self, group: &str, entries: &BTreeMap<String, String>) -> Result<()>;

    fn read_group(&self, group: &str) -> Result<BTreeMap<String, String>>;
}

/// Artifacts as files under an index directory. Files are written to a
/// temporary name and renamed into place; groups are written to a temporary
/// directory which then replaces the old one.
pub struct FsArtifactStore {
    paths: IndexPaths,
}

impl FsArtifactStore {
    pub fn new(paths: IndexPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| SearchError::io(dir, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(|e| SearchError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| SearchError::io(path, e))
}

impl ArtifactStore for FsArtifactStore {
    fn write(&self, name: &str, contents: &str) -> Result<()> {
        write_atomic(&self.paths.artifact(name), contents)
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.paths.artifact(name);
        fs::read_to_string(&path).map_err(|e| SearchError::io(path, e))
    }

    fn write_group(&self, group: &str, entries: &BTreeMap<String, String>) -> Result<()> {
        let target = self.paths.artifact(group);
        let staging = self.paths.artifact(&format!("{group}.tmp"));
        let retired = self.paths.artifact(&format!("{group}.old"));
        for dir in [&staging, &retired] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| SearchError::io(dir, e))?;
            }
        }
        fs::create_dir_all(&staging).map_err(|e| SearchError::io(&staging, e))?;
        for (name, contents) in entries {
            let path = staging.join(name);
            fs::write(&path, contents).map_err(|e| SearchError::io(path, e))?;
        }
        if target.exists() {
            fs::rename(&target, &retired).map_err(|e| SearchError::io(&target, e))?;
        }
        fs::rename(&staging, &target).map_err(|e| SearchError::io(&target, e))?;
        if retired.exists() {
            fs::remove_dir_all(&retired).map_err(|e| SearchError::io(&retired, e))?;
        }
        Ok(())
    }

    fn read_group(&self, group: &str) -> Result<BTreeMap<String, String>> {
        let dir = self.paths.artifact(group);
        let mut out = BTreeMap::new();
        for entry in fs::read_dir(&dir).map_err(|e| SearchError::io(&dir, e))? {
            let entry = entry.map_err(|e| SearchError::io(&dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let contents = fs::read_to_string(&path).map_err(|e| SearchError::io(&path, e))?;
            out.insert(name, contents);
        }
        Ok(out)
    }
}

/// In-process artifact store, used by tests and by callers that never touch
/// the disk.
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<String, String>>,
    groups: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn write(&self, name: &str, contents: &str) -> Result<()> {
        self.artifacts.write().insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<String> {
        self.artifacts.read().get(name).cloned().ok_or_else(|| {
            let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such artifact");
            SearchError::io(name, missing)
        })
    }

    fn write_group(&self, group: &str, entries: &BTreeMap<String, String>) -> Result<()> {
        self.groups.write().insert(group.to_string(), entries.clone());
        Ok(())
    }

    fn read_group(&self, group: &str) -> Result<BTreeMap<String, String>> {
        self.groups.read().get(group).cloned().ok_or_else(|| {
            let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such group");
            SearchError::io(group, missing)
        })
    }
}

// ---------- typed save / load ----------

pub fn save_postings(store: &dyn ArtifactStore, kind: TermKind, postings: &Postings) -> Result<()> {
    store.write(config::postings_artifact(kind), &encode_postings(postings))
}

pub fn load_postings(store: &dyn ArtifactStore, kind: TermKind) -> Result<Postings> {
    let name = config::postings_artifact(kind);
    decode_postings(name, &store.read(name)?)
}

pub fn save_forms(store: &dyn ArtifactStore, forms: &LemmaForms) -> Result<()> {
    store.write(config::LEMMA_FORMS, &encode_forms(forms))
}

pub fn load_forms(store: &dyn ArtifactStore) -> Result<LemmaForms> {
    decode_forms(config::LEMMA_FORMS, &store.read(config::LEMMA_FORMS)?)
}

pub fn save_meta(store: &dyn ArtifactStore, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    store.write(config::META, &json)
}

pub fn load_meta(store: &dyn ArtifactStore) -> Result<MetaFile> {
    let meta: MetaFile = serde_json::from_str(&store.read(config::META)?)?;
    if meta.version != FORMAT_VERSION {
        return Err(SearchError::CorpusInconsistency(format!(
            "index format version {} is not supported (expected {FORMAT_VERSION})",
            meta.version
        )));
    }
    Ok(meta)
}

/// Persist the vocabulary/idf table and one weight artifact per document.
pub fn save_table(store: &dyn ArtifactStore, table: &TfIdfTable) -> Result<()> {
    let entries: BTreeMap<String, String> = table
        .documents
        .iter()
        .map(|(id, records)| (format!("{id}.txt"), encode_weight_records(records)))
        .collect();
    store.write_group(config::weights_group(table.kind), &entries)?;
    store.write(config::idf_artifact(table.kind), &encode_idf(table))
}

pub fn load_table(store: &dyn ArtifactStore, kind: TermKind) -> Result<TfIdfTable> {
    let idf_name = config::idf_artifact(kind);
    let idf = decode_idf(idf_name, &store.read(idf_name)?)?;

    let group = config::weights_group(kind);
    let mut documents = BTreeMap::new();
    for (name, contents) in store.read_group(group)? {
        let Some(id) = name.strip_suffix(".txt").and_then(|s| s.parse::<DocId>().ok()) else {
            tracing::warn!(group, name = %name, "ignoring stray file in weights directory");
            continue;
        };
        let artifact = format!("{group}/{name}");
        documents.insert(id, decode_weight_records(&artifact, &contents)?);
    }
    TfIdfTable::assemble(kind, idf, documents)
}

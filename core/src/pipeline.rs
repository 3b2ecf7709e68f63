//! The indexing stages the command line tools run, in order.

use crate::analyzer::Analyzer;
use crate::error::{Result, SearchError};
use crate::index::{IndexBuild, InvertedIndexBuilder};
use crate::persist::{self, ArtifactStore};
use crate::store::DocumentStore;
use crate::tfidf::{self, TfIdfTable};
use crate::TermKind;
use std::collections::BTreeSet;

/// Build surface and lemma postings and persist them with the lemma forms
/// and the manifest. Previous artifacts are replaced.
pub fn run_index_stage(
    store: &dyn DocumentStore,
    analyzer: &Analyzer,
    artifacts: &dyn ArtifactStore,
) -> Result<IndexBuild> {
    let build = InvertedIndexBuilder::new(analyzer.clone()).build(store)?;
    for kind in TermKind::ALL {
        persist::save_postings(artifacts, kind, build.postings(kind))?;
    }
    persist::save_forms(artifacts, &build.forms)?;
    persist::save_meta(artifacts, &build.meta())?;
    Ok(build)
}

/// Recompute TF-IDF tables for persisted postings. The documents are
/// scanned again; the ones the manifest names must all still be readable.
pub fn run_tfidf_stage(
    store: &dyn DocumentStore,
    analyzer: &Analyzer,
    artifacts: &dyn ArtifactStore,
) -> Result<Vec<TfIdfTable>> {
    let meta = persist::load_meta(artifacts)?;
    let mut scan = InvertedIndexBuilder::new(analyzer.clone()).scan(store)?;

    let indexed: BTreeSet<_> = meta.doc_ids.iter().copied().collect();
    let scanned: BTreeSet<_> = scan.doc_ids().into_iter().collect();
    if let Some(missing) = indexed.difference(&scanned).next() {
        return Err(SearchError::CorpusInconsistency(format!(
            "document {missing} is indexed but could not be read from the document store"
        )));
    }
    let extra: Vec<_> = scanned.difference(&indexed).copied().collect();
    if !extra.is_empty() {
        tracing::warn!(?extra, "documents not covered by the index are left out of tf-idf");
        scan.documents.retain(|d| indexed.contains(&d.doc_id));
    }

    let mut tables = Vec::with_capacity(TermKind::ALL.len());
    for kind in TermKind::ALL {
        let postings = persist::load_postings(artifacts, kind)?;
        let table = tfidf::compute(&scan.documents, &postings, kind)?;
        persist::save_table(artifacts, &table)?;
        tables.push(table);
    }
    Ok(tables)
}

/// Index and weight in one run, reusing the document scan of the index stage.
pub fn run_build(
    store: &dyn DocumentStore,
    analyzer: &Analyzer,
    artifacts: &dyn ArtifactStore,
) -> Result<Vec<TfIdfTable>> {
    let build = run_index_stage(store, analyzer, artifacts)?;
    let mut tables = Vec::with_capacity(TermKind::ALL.len());
    for kind in TermKind::ALL {
        let table = tfidf::compute(&build.documents, build.postings(kind), kind)?;
        persist::save_table(artifacts, &table)?;
        tables.push(table);
    }
    Ok(tables)
}

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use regex::{Regex, RegexBuilder};
use search_core::config::{AnalyzerConfig, CorpusPaths, IndexPaths, DEFAULT_TOP_K, MAX_TOP_K};
use search_core::persist::FsArtifactStore;
use search_core::store::read_document;
use search_core::{
    Analyzer, DocId, FsDocumentStore, SearchError, SearchSnapshot, Similarity, SnapshotHandle,
};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shown to interactive and HTTP callers whenever a query cannot be answered.
pub const NO_RESULTS: &str = "no results, try again";

/// Everything needed to open a search engine over a built index.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub index: PathBuf,
    pub corpus: CorpusPaths,
    pub analyzer: AnalyzerConfig,
    pub similarity: Similarity,
}

/// A ranked hit resolved to its source url.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub doc_id: DocId,
    pub score: f64,
    pub url: Option<String>,
}

/// A boolean match resolved to its source url.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BooleanHit {
    pub doc_id: DocId,
    pub url: Option<String>,
}

/// Ranked answer to one query, all taken from a single snapshot.
#[derive(Debug, Clone)]
pub struct Ranked {
    /// Matching documents before the `k` cut.
    pub total: usize,
    pub hits: Vec<Hit>,
    /// Surface forms worth highlighting in snippets.
    pub highlight: Vec<String>,
}

/// The loaded index plus the corpus it was built from. Shared by the REPL
/// and the HTTP handlers. Every query resolves ids and urls against one
/// snapshot, and a reload installs index and urls with one pointer swap.
pub struct Engine {
    snapshot: SnapshotHandle,
    analyzer: Analyzer,
    artifacts: FsArtifactStore,
    corpus: CorpusPaths,
    similarity: Similarity,
}

impl Engine {
    pub fn open(config: EngineConfig) -> Result<Self> {
        let analyzer = Analyzer::from_config(&config.analyzer)?;
        let artifacts = FsArtifactStore::new(IndexPaths::new(&config.index));
        let docs = FsDocumentStore::open(config.corpus.clone())?;
        let snapshot = SnapshotHandle::new(SearchSnapshot::load(&artifacts, &docs)?);
        Ok(Self {
            snapshot,
            analyzer,
            artifacts,
            corpus: config.corpus,
            similarity: config.similarity,
        })
    }

    /// Ranked vector-space search, best first, at most `k` hits.
    pub fn search(&self, query: &str, k: usize) -> Result<Ranked, SearchError> {
        let snapshot = self.snapshot.current();
        let scored = snapshot.vector_search(&self.analyzer, query, self.similarity)?;
        let total = scored.len();
        let hits = scored
            .into_iter()
            .take(k)
            .map(|s| Hit { doc_id: s.doc_id, score: s.score, url: url_in(&snapshot, s.doc_id) })
            .collect();
        let highlight = self.highlight_terms(&snapshot, query);
        Ok(Ranked { total, hits, highlight })
    }

    /// Boolean query such as `a AND NOT b`; ids ascending.
    pub fn boolean(&self, query: &str) -> Result<Vec<BooleanHit>, SearchError> {
        let snapshot = self.snapshot.current();
        let ids = snapshot.boolean_search(&self.analyzer, query)?;
        let hits = ids
            .into_iter()
            .map(|doc_id| BooleanHit { doc_id, url: url_in(&snapshot, doc_id) })
            .collect();
        Ok(hits)
    }

    pub fn url_of(&self, doc_id: DocId) -> Option<String> {
        url_in(&self.snapshot.current(), doc_id)
    }

    pub fn text_of(&self, doc_id: DocId) -> Result<String, SearchError> {
        read_document(&self.corpus, doc_id)
    }

    /// Url and text of an indexed document; `None` for ids the current
    /// index does not know.
    pub fn document(&self, doc_id: DocId) -> Option<(String, Result<String, SearchError>)> {
        let url = self.url_of(doc_id)?;
        Some((url, self.text_of(doc_id)))
    }

    /// Every form the corpus showed for each query lemma, plus the query
    /// words themselves.
    fn highlight_terms(&self, snapshot: &SearchSnapshot, query: &str) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for term in self.analyzer.analyze(query) {
            if let Some(forms) = snapshot.forms.get(&term.lemma) {
                terms.extend(forms.iter().cloned());
            }
            terms.push(term.surface);
        }
        terms.sort();
        terms.dedup();
        terms
    }

    /// Load the index and the document index again and swap them in.
    /// Queries running meanwhile finish on the snapshot they started with.
    pub fn reload(&self) -> Result<usize, SearchError> {
        let docs = FsDocumentStore::open(self.corpus.clone())?;
        let fresh = self.snapshot.reload(&self.artifacts, &docs)?;
        Ok(fresh.meta.num_docs as usize)
    }

    pub fn num_docs(&self) -> usize {
        self.snapshot.current().meta.num_docs as usize
    }
}

fn url_in(snapshot: &SearchSnapshot, doc_id: DocId) -> Option<String> {
    snapshot.url_of(doc_id).map(str::to_string)
}

/// Line-oriented query loop. Lines with a boolean operator are evaluated as
/// set queries, everything else is ranked; each hit prints its url.
pub fn run_repl<R: BufRead, W: Write>(
    engine: &Engine,
    input: R,
    mut out: W,
    k: usize,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }
        if is_boolean(query) {
            match engine.boolean(query) {
                Ok(hits) if !hits.is_empty() => {
                    for hit in hits {
                        writeln!(out, "{}", hit.url.unwrap_or_else(|| format!("#{}", hit.doc_id)))?;
                    }
                }
                Ok(_) => writeln!(out, "{NO_RESULTS}")?,
                Err(e) => {
                    tracing::debug!(error = %e, query, "boolean query failed");
                    writeln!(out, "{NO_RESULTS}")?;
                }
            }
        } else {
            match engine.search(query, k) {
                Ok(ranked) if !ranked.hits.is_empty() => {
                    for (rank, hit) in ranked.hits.iter().enumerate() {
                        let url = hit.url.clone().unwrap_or_else(|| format!("#{}", hit.doc_id));
                        writeln!(out, "{}. {url} ({:.4})", rank + 1, hit.score)?;
                    }
                }
                Ok(_) => writeln!(out, "{NO_RESULTS}")?,
                Err(e) => {
                    tracing::debug!(error = %e, query, "search failed");
                    writeln!(out, "{NO_RESULTS}")?;
                }
            }
        }
        out.flush()?;
    }
    Ok(())
}

fn is_boolean(query: &str) -> bool {
    query
        .split_whitespace()
        .any(|w| matches!(w.to_uppercase().as_str(), "AND" | "OR" | "NOT"))
}

// ---------- HTTP ----------

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Deserialize)]
pub struct BooleanParams {
    pub q: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub url: Option<String>,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct BooleanResponse {
    pub query: String,
    pub total_hits: usize,
    pub results: Vec<BooleanHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub admin_token: Option<String>,
}

pub fn build_app(config: EngineConfig) -> Result<Router> {
    let engine = Engine::open(config)?;
    tracing::info!(documents = engine.num_docs(), "index loaded");
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    Ok(router(AppState { engine: Arc::new(engine), admin_token }))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/boolean", get(boolean_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, MAX_TOP_K);
    let (total_hits, results, message) = match state.engine.search(&params.q, k) {
        Ok(ranked) => {
            let pattern = terms_pattern(&ranked.highlight);
            let results = ranked
                .hits
                .into_iter()
                .map(|hit| {
                    let snippet = pattern.as_ref().and_then(|re| {
                        let text = state.engine.text_of(hit.doc_id).ok()?;
                        snippet(&text, re)
                    });
                    SearchHit { doc_id: hit.doc_id, score: hit.score, url: hit.url, snippet }
                })
                .collect::<Vec<_>>();
            let message = results.is_empty().then(|| NO_RESULTS.to_string());
            (ranked.total, results, message)
        }
        Err(e) => {
            log_query_error(&e, &params.q);
            (0, Vec::new(), Some(NO_RESULTS.to_string()))
        }
    };
    let took_s = start.elapsed().as_secs_f64();
    Json(SearchResponse { query: params.q, took_s, total_hits, results, message })
}

pub async fn boolean_handler(
    State(state): State<AppState>,
    Query(params): Query<BooleanParams>,
) -> Json<BooleanResponse> {
    let (results, message) = match state.engine.boolean(&params.q) {
        Ok(results) => {
            let message = results.is_empty().then(|| NO_RESULTS.to_string());
            (results, message)
        }
        Err(e) => {
            log_query_error(&e, &params.q);
            (Vec::new(), Some(NO_RESULTS.to_string()))
        }
    };
    Json(BooleanResponse { query: params.q, total_hits: results.len(), results, message })
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let not_found = || (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" })));
    let (url, text) = state.engine.document(doc_id).ok_or_else(not_found)?;
    let mut obj = serde_json::json!({ "doc_id": doc_id, "url": url });
    match text {
        Ok(text) => obj["text"] = serde_json::Value::String(text),
        Err(e) => tracing::warn!(doc_id, error = %e, "document text unavailable"),
    }
    Ok(Json(obj))
}

async fn reload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let engine = state.engine.clone();
    let reloaded = tokio::task::spawn_blocking(move || engine.reload())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    match reloaded {
        Ok(documents) => {
            tracing::info!(documents, "index reloaded");
            Ok(Json(serde_json::json!({ "reloaded": true, "documents": documents })))
        }
        Err(e) => {
            tracing::error!(error = %e, "reload failed, keeping the current index");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

fn log_query_error(e: &SearchError, query: &str) {
    if e.is_query_error() {
        tracing::debug!(error = %e, query, "query rejected");
    } else {
        tracing::error!(error = %e, query, "query failed");
    }
}

/// Case-insensitive whole-word alternation over `terms`.
fn terms_pattern(terms: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> =
        terms.iter().filter(|t| !t.trim().is_empty()).map(|t| regex::escape(t)).collect();
    if alternatives.is_empty() {
        return None;
    }
    RegexBuilder::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
        .case_insensitive(true)
        .build()
        .ok()
}

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

/// Window around the first match with every match wrapped in `<em>`.
fn snippet(text: &str, pattern: &Regex) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let window = match pattern.find(text) {
        Some(m) => {
            let start = char_boundary(text, m.start().saturating_sub(SNIPPET_BEFORE));
            let end = char_boundary(text, (m.start() + SNIPPET_AFTER).min(text.len()));
            &text[start..end]
        }
        None => &text[..char_boundary(text, SNIPPET_AFTER.min(text.len()))],
    };
    let marked =
        pattern.replace_all(window, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0]));
    Some(marked.into_owned())
}

/// Largest char boundary not after `idx`.
fn char_boundary(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use search_core::config::{AnalyzerConfig, CorpusPaths, IndexPaths};
use search_core::persist::FsArtifactStore;
use search_core::pipeline::run_build;
use search_core::{Analyzer, FsDocumentStore, Similarity};
use serde_json::Value;
use server::{router, run_repl, AppState, BooleanHit, Engine, EngineConfig, NO_RESULTS};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

const DICTIONARY: &str = "\
# surface lemma pos
кот кот noun
кота кот noun
сидит сидеть verb
спит спать verb
собака собака noun
бежит бежать verb
и и conjunction
на на preposition
";

fn write_corpus(dir: &Path, texts: &[&str]) {
    let corpus = dir.join("result");
    fs::create_dir_all(&corpus).unwrap();
    let mut index = String::new();
    for (id, text) in texts.iter().enumerate() {
        fs::write(corpus.join(format!("{id}.txt")), text).unwrap();
        index.push_str(&format!("{id}: http://scp.example/scp-{:03}\n", id + 2));
    }
    fs::write(dir.join("index.txt"), index).unwrap();
}

fn config(dir: &Path) -> EngineConfig {
    EngineConfig {
        index: dir.join("index"),
        corpus: CorpusPaths::new(dir.join("result"), dir.join("index.txt")),
        analyzer: AnalyzerConfig { dictionary: Some(dir.join("dict.txt")), ..Default::default() },
        similarity: Similarity::Cosine,
    }
}

fn build_index(dir: &Path) {
    let config = config(dir);
    let analyzer = Analyzer::from_config(&config.analyzer).unwrap();
    let store = FsDocumentStore::open(config.corpus).unwrap();
    run_build(&store, &analyzer, &FsArtifactStore::new(IndexPaths::new(config.index))).unwrap();
}

fn setup(dir: &Path, texts: &[&str]) -> Arc<Engine> {
    fs::write(dir.join("dict.txt"), DICTIONARY).unwrap();
    write_corpus(dir, texts);
    build_index(dir);
    Arc::new(Engine::open(config(dir)).unwrap())
}

fn app(engine: Arc<Engine>) -> Router {
    router(AppState { engine, admin_token: Some("secret".into()) })
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn ids(json: &Value) -> Vec<u64> {
    json["results"].as_array().unwrap().iter().map(|r| r["doc_id"].as_u64().unwrap()).collect()
}

fn doc_ids(hits: Vec<BooleanHit>) -> Vec<u32> {
    hits.into_iter().map(|h| h.doc_id).collect()
}

fn reload_request(token: &str) -> Request<Body> {
    Request::post("/admin/reload").header("X-ADMIN-TOKEN", token).body(Body::empty()).unwrap()
}

const CORPUS: [&str; 3] = ["Кот сидит", "кот спит", "собака бежит"];

#[tokio::test]
async fn health_is_ok() {
    let dir = tempdir().unwrap();
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(setup(dir.path(), &CORPUS)), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn search_returns_ranked_results_with_urls() {
    let dir = tempdir().unwrap();
    let app = app(setup(dir.path(), &CORPUS));

    let (status, json) = get(app, "/search?q=%D0%BA%D0%BE%D1%82&k=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![0, 1]);
    assert_eq!(json["total_hits"], 2);
    assert_eq!(json["results"][0]["url"], "http://scp.example/scp-002");
    assert_eq!(json["results"][0]["snippet"], "<em>Кот</em> сидит");
    assert!(json.get("message").is_none());
}

#[tokio::test]
async fn search_respects_k() {
    let dir = tempdir().unwrap();
    let app = app(setup(dir.path(), &CORPUS));
    let (_, json) = get(app, "/search?q=%D0%BA%D0%BE%D1%82&k=1").await;
    assert_eq!(ids(&json), vec![0]);
    assert_eq!(json["total_hits"], 2);
}

#[tokio::test]
async fn query_of_excluded_words_gets_the_retry_message() {
    let dir = tempdir().unwrap();
    let app = app(setup(dir.path(), &CORPUS));
    // "и на"
    let (status, json) = get(app, "/search?q=%D0%B8%20%D0%BD%D0%B0").await;
    assert_eq!(status, StatusCode::OK);
    assert!(ids(&json).is_empty());
    assert_eq!(json["message"], NO_RESULTS);
}

#[tokio::test]
async fn boolean_and_not() {
    let dir = tempdir().unwrap();
    let engine = setup(dir.path(), &CORPUS);
    assert_eq!(doc_ids(engine.boolean("кот AND NOT собака").unwrap()), vec![0, 1]);
    assert_eq!(doc_ids(engine.boolean("кот AND сидит").unwrap()), vec![0]);

    // "кот OR собака"
    let uri = "/boolean?q=%D0%BA%D0%BE%D1%82%20OR%20%D1%81%D0%BE%D0%B1%D0%B0%D0%BA%D0%B0";
    let (status, json) = get(app(engine), uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec![0, 1, 2]);
    assert_eq!(json["results"][2]["url"], "http://scp.example/scp-004");
}

#[tokio::test]
async fn boolean_with_unknown_term_gets_the_retry_message() {
    let dir = tempdir().unwrap();
    let app = app(setup(dir.path(), &CORPUS));
    // "кот AND дракон"
    let uri = "/boolean?q=%D0%BA%D0%BE%D1%82%20AND%20%D0%B4%D1%80%D0%B0%D0%BA%D0%BE%D0%BD";
    let (_, json) = get(app, uri).await;
    assert!(ids(&json).is_empty());
    assert_eq!(json["message"], NO_RESULTS);
}

#[tokio::test]
async fn doc_returns_url_and_text() {
    let dir = tempdir().unwrap();
    let engine = setup(dir.path(), &CORPUS);

    let (status, json) = get(app(engine.clone()), "/doc/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["url"], "http://scp.example/scp-004");
    assert_eq!(json["text"], "собака бежит");

    let (status, _) = get(app(engine), "/doc/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reload_requires_the_admin_token() {
    let dir = tempdir().unwrap();
    let engine = setup(dir.path(), &CORPUS);

    let req = Request::post("/admin/reload").body(Body::empty()).unwrap();
    let (status, _) = send(app(engine.clone()), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(app(engine), reload_request("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reload_picks_up_a_rebuilt_index() {
    let dir = tempdir().unwrap();
    let engine = setup(dir.path(), &CORPUS);
    assert_eq!(doc_ids(engine.boolean("собака AND бежит").unwrap()), vec![2]);

    write_corpus(dir.path(), &["собака спит", "кот бежит", "собака бежит", "кота нет"]);
    build_index(dir.path());

    let (status, body) = send(app(engine.clone()), reload_request("secret")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["documents"], 4);

    assert_eq!(doc_ids(engine.boolean("собака AND бежит").unwrap()), vec![2]);
    assert_eq!(doc_ids(engine.boolean("кот OR собака").unwrap()), vec![0, 1, 2, 3]);
    assert_eq!(engine.url_of(3).as_deref(), Some("http://scp.example/scp-005"));
}

#[test]
fn urls_only_change_together_with_the_index() {
    let dir = tempdir().unwrap();
    let engine = setup(dir.path(), &CORPUS);
    let mirror = ["http://mirror.example/a", "http://mirror.example/b", "http://mirror.example/c"];
    let lines: String =
        mirror.iter().enumerate().map(|(id, url)| format!("{id}: {url}\n")).collect();
    fs::write(dir.path().join("index.txt"), lines).unwrap();

    // The document index moved on but the index can not be loaded: nothing changes.
    fs::remove_file(dir.path().join("index").join("meta.json")).unwrap();
    assert!(engine.reload().is_err());
    let hits = engine.search("кот", 10).unwrap().hits;
    assert_eq!(hits[0].url.as_deref(), Some("http://scp.example/scp-002"));
    assert_eq!(engine.url_of(2).as_deref(), Some("http://scp.example/scp-004"));

    build_index(dir.path());
    assert_eq!(engine.reload().unwrap(), 3);
    let hits = engine.search("кот", 10).unwrap().hits;
    assert_eq!(hits[0].url.as_deref(), Some(mirror[0]));
    let matched = engine.boolean("собака AND бежит").unwrap();
    assert_eq!(matched, vec![BooleanHit { doc_id: 2, url: Some(mirror[2].to_string()) }]);
}

#[test]
fn punctuated_boolean_operands_are_accepted() {
    let dir = tempdir().unwrap();
    let engine = setup(dir.path(), &CORPUS);
    assert_eq!(doc_ids(engine.boolean("«кот» AND сидит").unwrap()), vec![0]);
    assert_eq!(doc_ids(engine.boolean("кот, OR собака").unwrap()), vec![0, 1, 2]);
    assert!(engine.boolean("кот AND scp-173").is_err());
}

#[test]
fn repl_prints_urls_and_recovers_from_bad_queries() {
    let dir = tempdir().unwrap();
    let engine = setup(dir.path(), &CORPUS);
    let input = "кот\nкот AND NOT собака\nи на\nкот AND\n\nсобака\nexit\nкот\n";
    let mut out = Vec::new();
    run_repl(&engine, input.as_bytes(), &mut out, 10).unwrap();

    let out = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].starts_with("1. http://scp.example/scp-002 ("));
    assert!(lines[1].starts_with("2. http://scp.example/scp-003 ("));
    assert_eq!(lines[2], "http://scp.example/scp-002");
    assert_eq!(lines[3], "http://scp.example/scp-003");
    assert_eq!(lines[4], NO_RESULTS);
    assert_eq!(lines[5], NO_RESULTS);
    assert!(lines[6].starts_with("1. http://scp.example/scp-004 ("));
    assert_eq!(lines.len(), 7);
}

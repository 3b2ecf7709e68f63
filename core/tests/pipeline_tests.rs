use search_core::config::{CorpusPaths, IndexPaths};
use search_core::normalizer::{DictionaryNormalizer, PosFilter};
use search_core::persist::{self, FsArtifactStore};
use search_core::pipeline::{run_build, run_index_stage, run_tfidf_stage};
use search_core::{
    Analyzer, BooleanOp, BooleanRetriever, FsDocumentStore, SearchError, SearchSnapshot, Similarity,
    TermKind,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn analyzer() -> Analyzer {
    let dict = DictionaryNormalizer::parse(
        "test-dictionary",
        "кот кот noun\n\
         сидит сидеть verb\n\
         спит спать verb\n\
         собака собака noun\n\
         бежит бежать verb\n\
         и и conjunction\n\
         на на preposition\n\
         три три numeral\n",
    )
    .unwrap();
    Analyzer::new(Arc::new(dict), PosFilter::default())
}

fn write_corpus(dir: &Path, texts: &[&str]) -> CorpusPaths {
    let corpus = dir.join("result");
    fs::create_dir_all(&corpus).unwrap();
    let mut index = String::new();
    for (id, text) in texts.iter().enumerate() {
        fs::write(corpus.join(format!("{id}.txt")), text).unwrap();
        index.push_str(&format!("{id}: http://scp.example/{id:03}\n"));
    }
    let doc_index = dir.join("index.txt");
    fs::write(&doc_index, index).unwrap();
    CorpusPaths::new(corpus, doc_index)
}

fn snapshot_of_dir(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if path.is_dir() {
            for (inner, bytes) in snapshot_of_dir(&path) {
                files.insert(format!("{name}/{inner}"), bytes);
            }
        } else {
            files.insert(name, fs::read(&path).unwrap());
        }
    }
    files
}

const CORPUS: [&str; 3] = ["кот сидит", "кот спит", "собака бежит"];

#[test]
fn three_document_scenario() {
    let dir = tempdir().unwrap();
    let store = FsDocumentStore::open(write_corpus(dir.path(), &CORPUS)).unwrap();
    let artifacts = FsArtifactStore::new(IndexPaths::new(dir.path().join("index")));
    let a = analyzer();

    let tables = run_build(&store, &a, &artifacts).unwrap();
    let lemma = tables.iter().find(|t| t.kind == TermKind::Lemma).unwrap();
    assert!((lemma.idf_of("кот").unwrap() - (3.0f64 / 2.0).ln()).abs() < 1e-12);

    let snapshot = SearchSnapshot::load(&artifacts, &store).unwrap();
    assert_eq!(snapshot.url_of(2), Some("http://scp.example/002"));
    assert_eq!(snapshot.postings.get("кот").unwrap(), &BTreeSet::from([0, 1]));

    let hits = snapshot.vector_search(&a, "кот", Similarity::Cosine).unwrap();
    assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![0, 1]);

    let retriever = BooleanRetriever::new(&snapshot.postings);
    let not = retriever.evaluate("кот", "собака", BooleanOp::AndNot).unwrap();
    assert_eq!(not, BTreeSet::from([0, 1]));
    assert_eq!(snapshot.boolean_search(&a, "кот AND NOT собака").unwrap(), BTreeSet::from([0, 1]));
    assert_eq!(snapshot.boolean_search(&a, "сидит OR спит").unwrap(), BTreeSet::from([0, 1]));

    let stop_words = snapshot.vector_search(&a, "и на три", Similarity::Cosine);
    assert!(matches!(stop_words, Err(SearchError::EmptyQuery)));
    let unknown = snapshot.boolean_search(&a, "кот AND дракон");
    assert!(matches!(unknown, Err(SearchError::UnknownTerm(_))));
}

#[test]
fn artifacts_use_the_line_formats() {
    let dir = tempdir().unwrap();
    let store = FsDocumentStore::open(write_corpus(dir.path(), &CORPUS)).unwrap();
    let root = dir.path().join("index");
    run_build(&store, &analyzer(), &FsArtifactStore::new(IndexPaths::new(&root))).unwrap();

    let lemma_index = fs::read_to_string(root.join("lemma_index.txt")).unwrap();
    assert_eq!(lemma_index, "бежать 2\nкот 0 1\nсидеть 0\nсобака 2\nспать 1\n");
    let surface_index = fs::read_to_string(root.join("surface_index.txt")).unwrap();
    assert!(surface_index.contains("сидит 0\n"));
    let forms = fs::read_to_string(root.join("lemma_forms.txt")).unwrap();
    assert!(forms.contains("сидеть сидит\n"));

    let weights = fs::read_to_string(root.join("tfidf_lemma").join("0.txt")).unwrap();
    let first = weights.lines().next().unwrap();
    let fields: Vec<&str> = first.split(' ').collect();
    assert_eq!(fields[0], "кот");
    let idf: f64 = fields[1].parse().unwrap();
    let w: f64 = fields[2].parse().unwrap();
    assert!((w - 0.5 * idf).abs() < 1e-12);
}

#[test]
fn rebuilding_gives_identical_artifacts() {
    let dir = tempdir().unwrap();
    let texts = ["кот сидит и спит", "кот", "собака бежит на кот"];
    let store = FsDocumentStore::open(write_corpus(dir.path(), &texts)).unwrap();
    let root = dir.path().join("index");
    let artifacts = FsArtifactStore::new(IndexPaths::new(&root));

    run_build(&store, &analyzer(), &artifacts).unwrap();
    let first = snapshot_of_dir(&root);
    run_index_stage(&store, &analyzer(), &artifacts).unwrap();
    run_tfidf_stage(&store, &analyzer(), &artifacts).unwrap();
    let second = snapshot_of_dir(&root);

    assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
    assert_eq!(first, second);
}

#[test]
fn tf_idf_properties_hold_for_both_granularities() {
    let dir = tempdir().unwrap();
    let texts = ["кот сидит кот", "кот спит", "собака бежит и кот сидит"];
    let store = FsDocumentStore::open(write_corpus(dir.path(), &texts)).unwrap();
    let artifacts = FsArtifactStore::new(IndexPaths::new(dir.path().join("index")));
    let a = analyzer();
    let build = run_index_stage(&store, &a, &artifacts).unwrap();
    run_tfidf_stage(&store, &a, &artifacts).unwrap();

    for kind in TermKind::ALL {
        let table = persist::load_table(&artifacts, kind).unwrap();
        let postings = persist::load_postings(&artifacts, kind).unwrap();
        assert_eq!(table.corpus_size(), 3);
        for (term, ids) in postings.iter() {
            let idf = table.idf_of(term).unwrap();
            assert!(idf >= 0.0);
            assert_eq!(idf == 0.0, ids.len() == 3, "{kind} {term}");
        }
        for doc in &build.documents {
            let counts = doc.counts(kind);
            // The denominator is every kept token, including terms weighted zero.
            assert_eq!(doc.total as usize, a.analyze(texts[doc.doc_id as usize]).len());
            assert_eq!(counts.values().sum::<u32>(), doc.total, "doc {}", doc.doc_id);
            let tf_sum: f64 = counts.values().map(|&c| c as f64 / doc.total as f64).sum();
            assert!((tf_sum - 1.0).abs() < 1e-12, "{kind} doc {}", doc.doc_id);

            let records = table.records(doc.doc_id).unwrap();
            assert_eq!(records.len(), counts.len());
            for r in records {
                let tf = counts[&r.term] as f64 / doc.total as f64;
                let diff = (r.tf_idf - tf * r.idf).abs();
                assert!(diff < 1e-12, "{kind} doc {} {}", doc.doc_id, r.term);
            }
            let vector = table.vector(doc.doc_id).unwrap();
            assert_eq!(vector.len(), table.vocabulary.len());
        }
    }

    // "кот" twice among three kept tokens of document 0.
    let lemma = persist::load_table(&artifacts, TermKind::Lemma).unwrap();
    let cat = lemma.records(0).unwrap().iter().find(|r| r.term == "кот").unwrap();
    assert!((cat.tf_idf - 2.0 / 3.0 * (3.0f64 / 3.0).ln()).abs() < 1e-12);
    let sits = lemma.records(0).unwrap().iter().find(|r| r.term == "сидеть").unwrap();
    assert!((sits.tf_idf - 1.0 / 3.0 * (3.0f64 / 2.0).ln()).abs() < 1e-12);
}

#[test]
fn deleted_document_fails_the_tfidf_stage() {
    let dir = tempdir().unwrap();
    let corpus = write_corpus(dir.path(), &CORPUS);
    let store = FsDocumentStore::open(corpus.clone()).unwrap();
    let artifacts = FsArtifactStore::new(IndexPaths::new(dir.path().join("index")));
    run_index_stage(&store, &analyzer(), &artifacts).unwrap();

    fs::remove_file(corpus.document(1)).unwrap();
    let err = run_tfidf_stage(&store, &analyzer(), &artifacts).unwrap_err();
    assert!(matches!(err, SearchError::CorpusInconsistency(_)));
}

#[test]
fn unreadable_document_is_left_out_of_the_corpus() {
    let dir = tempdir().unwrap();
    let corpus = write_corpus(dir.path(), &CORPUS);
    fs::remove_file(corpus.document(2)).unwrap();
    let store = FsDocumentStore::open(corpus).unwrap();
    let artifacts = FsArtifactStore::new(IndexPaths::new(dir.path().join("index")));

    let build = run_index_stage(&store, &analyzer(), &artifacts).unwrap();
    assert_eq!(build.skipped.len(), 1);
    let tables = run_tfidf_stage(&store, &analyzer(), &artifacts).unwrap();
    assert!(tables.iter().all(|t| t.corpus_size() == 2));
    // "кот" is in both readable documents.
    let lemma = tables.iter().find(|t| t.kind == TermKind::Lemma).unwrap();
    assert_eq!(lemma.idf_of("кот"), Some(0.0));
}

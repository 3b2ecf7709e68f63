use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use search_core::config::{AnalyzerConfig, CorpusPaths, IndexPaths};
use search_core::normalizer::{Language, PosFilter};
use search_core::persist::FsArtifactStore;
use search_core::pipeline::{run_build, run_index_stage, run_tfidf_stage};
use search_core::{Analyzer, FsDocumentStore, TfIdfTable};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(
    about = "Build lemma and surface-form indices and TF-IDF weights for a crawled corpus",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build surface and lemma postings, lemma forms and the manifest
    Index(StageArgs),
    /// Recompute TF-IDF weights for an existing index
    Tfidf(StageArgs),
    /// Run both stages in one pass over the corpus
    Build(StageArgs),
}

#[derive(Args)]
struct StageArgs {
    /// Directory holding one `{id}.txt` per document
    #[arg(long, default_value = "result")]
    corpus: PathBuf,
    /// Document index with `id: url` lines
    #[arg(long, default_value = "index.txt")]
    doc_index: PathBuf,
    /// Output index directory
    #[arg(long, default_value = "index")]
    out: PathBuf,
    #[command(flatten)]
    analyzer: AnalyzerArgs,
}

#[derive(Args)]
struct AnalyzerArgs {
    /// Stemming language used for words missing from the dictionary (ru, en)
    #[arg(long, default_value = "ru")]
    language: Language,
    /// Morphological dictionary with `surface lemma pos` lines
    #[arg(long)]
    dictionary: Option<PathBuf>,
    /// Comma separated parts of speech that never become index terms
    #[arg(long, value_parser = PosFilter::parse_list)]
    exclude_pos: Option<PosFilter>,
}

impl AnalyzerArgs {
    fn into_config(self) -> AnalyzerConfig {
        AnalyzerConfig {
            language: self.language,
            dictionary: self.dictionary,
            filter: self.exclude_pos.unwrap_or_default(),
        }
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Index(args) => {
            let (store, analyzer, artifacts) = open(args)?;
            let build =
                run_index_stage(&store, &analyzer, &artifacts).context("index stage failed")?;
            for skipped in &build.skipped {
                eprintln!("skipped document {}: {}", skipped.doc_id, skipped.reason);
            }
            tracing::info!(
                documents = build.documents.len(),
                lemmas = build.lemma.len(),
                surface_terms = build.surface.len(),
                out = %artifacts.paths().root.display(),
                "index stage complete"
            );
        }
        Commands::Tfidf(args) => {
            let (store, analyzer, artifacts) = open(args)?;
            let tables =
                run_tfidf_stage(&store, &analyzer, &artifacts).context("tf-idf stage failed")?;
            report(&tables, &artifacts);
        }
        Commands::Build(args) => {
            let (store, analyzer, artifacts) = open(args)?;
            let tables = run_build(&store, &analyzer, &artifacts).context("build failed")?;
            report(&tables, &artifacts);
        }
    }
    Ok(())
}

fn open(args: StageArgs) -> Result<(FsDocumentStore, Analyzer, FsArtifactStore)> {
    let corpus = CorpusPaths::new(&args.corpus, &args.doc_index);
    let store = FsDocumentStore::open(corpus)
        .with_context(|| format!("opening corpus {}", args.corpus.display()))?;
    let analyzer = Analyzer::from_config(&args.analyzer.into_config())?;
    let excluded: Vec<String> = analyzer.filter().excluded().map(|p| p.to_string()).collect();
    tracing::debug!(?excluded, "part-of-speech filter");
    Ok((store, analyzer, FsArtifactStore::new(IndexPaths::new(&args.out))))
}

fn report(tables: &[TfIdfTable], artifacts: &FsArtifactStore) {
    for table in tables {
        tracing::info!(
            kind = %table.kind,
            documents = table.corpus_size(),
            terms = table.vocabulary.len(),
            "weights written"
        );
    }
    tracing::info!(out = %artifacts.paths().root.display(), "tf-idf stage complete");
}

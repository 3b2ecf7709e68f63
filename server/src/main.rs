use anyhow::Result;
use axum::Router;
use clap::{Args, Parser, Subcommand};
use search_core::config::{AnalyzerConfig, CorpusPaths, DEFAULT_TOP_K};
use search_core::normalizer::{Language, PosFilter};
use search_core::Similarity;
use server::{build_app, run_repl, Engine, EngineConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Query a built index interactively or over HTTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read queries from stdin and print matching urls
    Repl {
        #[command(flatten)]
        engine: EngineArgs,
        /// Ranked hits printed per query
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        k: usize,
    },
    /// Serve the HTTP search API
    Serve {
        #[command(flatten)]
        engine: EngineArgs,
        /// Host to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to bind
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Directory holding one `{id}.txt` per document
    #[arg(long, default_value = "result")]
    corpus: PathBuf,
    /// Document index with `id: url` lines
    #[arg(long, default_value = "index.txt")]
    doc_index: PathBuf,
    /// Stemming language used for words missing from the dictionary (ru, en)
    #[arg(long, default_value = "ru")]
    language: Language,
    /// Morphological dictionary with `surface lemma pos` lines
    #[arg(long)]
    dictionary: Option<PathBuf>,
    /// Comma separated parts of speech dropped from queries
    #[arg(long, value_parser = PosFilter::parse_list)]
    exclude_pos: Option<PosFilter>,
    /// cosine or reference-sum
    #[arg(long, default_value = "cosine")]
    similarity: Similarity,
}

impl EngineArgs {
    fn into_config(self) -> EngineConfig {
        EngineConfig {
            index: self.index,
            corpus: CorpusPaths::new(&self.corpus, &self.doc_index),
            analyzer: AnalyzerConfig {
                language: self.language,
                dictionary: self.dictionary,
                filter: self.exclude_pos.unwrap_or_default(),
            },
            similarity: self.similarity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Repl { engine, k } => {
            let engine = Engine::open(engine.into_config())?;
            tokio::task::spawn_blocking(move || {
                let stdin = std::io::stdin();
                run_repl(&engine, stdin.lock(), std::io::stdout(), k)
            })
            .await??;
        }
        Commands::Serve { engine, host, port } => {
            let app: Router = build_app(engine.into_config())?;
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(%addr, "server listening");
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

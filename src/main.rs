//! # Knowledge Worker CLI (`kw`)
//!
//! Answers questions about a folder of company documents. Documents are
//! loaded, chunked and embedded into a local vector store; questions are
//! answered by a chat model from the most similar chunks.
//!
//! ## Modes
//!
//! | Mode | Description |
//! |------|-------------|
//! | `web` | Serve the chat page and JSON API (default) |
//! | `cli` | Interactive terminal chat |
//! | `build` | Build or update the vector store and exit |
//! | `stats` | Print vector store statistics |
//! | `search` | Print the chunks retrieved for `--query` |
//!
//! `web` and `cli` build the store first when it is empty or `--rebuild-db`
//! is given.
//!
//! ## Examples
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! kw --mode build --rebuild-db
//! kw --mode cli
//! kw --mode search --query "expense policy"
//! kw --port 8080 --share
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use knowledge_worker::config::{self, Config};
use knowledge_worker::embedding::OpenAiEmbedder;
use knowledge_worker::ingest;
use knowledge_worker::llm::OpenAiChat;
use knowledge_worker::logging;
use knowledge_worker::openai::OpenAiClient;
use knowledge_worker::rag::RagPipeline;
use knowledge_worker::repl;
use knowledge_worker::server;
use knowledge_worker::stats;
use knowledge_worker::store::VectorStore;

/// Knowledge Worker: ask questions about your company's documents.
///
/// Settings come from `--config` (or `./kw.toml` when present), a `.env`
/// file and the process environment, in increasing priority.
/// `OPENAI_API_KEY` is required.
#[derive(Parser)]
#[command(name = "kw", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// What to run.
    #[arg(long, value_enum, default_value_t = Mode::Web)]
    mode: Mode,

    /// Clear the vector store and rebuild it from the documents.
    #[arg(long)]
    rebuild_db: bool,

    /// Log verbosity: debug, info, warning or error. `RUST_LOG` overrides it.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to stderr only, without the daily file under LOG_DIR.
    #[arg(long)]
    no_log_file: bool,

    /// Web port (overrides WEB_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Listen on all interfaces (overrides WEB_SHARE).
    #[arg(long)]
    share: bool,

    /// Do not open the browser in web mode.
    #[arg(long)]
    no_browser: bool,

    /// Query text for `--mode search`.
    #[arg(long)]
    query: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Web,
    Cli,
    Build,
    Stats,
    Search,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if cli.no_log_file {
        cfg.logging.to_file = false;
    }
    let _log_guard = logging::init(&cli.log_level, cfg.logging.file_dir())?;

    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    if cli.share {
        cfg.server.share = true;
    }
    info!(
        root = %cfg.documents.root.display(),
        store = %cfg.store.db_path().display(),
        model = %cfg.openai.model,
        embedding_model = %cfg.openai.embedding_model,
        "configuration loaded"
    );

    let store = open_store(&cfg).await?;

    match cli.mode {
        Mode::Build => {
            ingest::run_build(&cfg, &store, cli.rebuild_db).await?;
        }
        Mode::Stats => {
            stats::run_stats(&store).await?;
        }
        Mode::Search => {
            let Some(query) = cli.query.as_deref().filter(|q| !q.trim().is_empty()) else {
                bail!("--mode search requires --query");
            };
            run_search(&store, query, cfg.retrieval.k).await?;
        }
        Mode::Cli | Mode::Web => {
            if let Some(summary) = ingest::ensure_index(&cfg, &store, cli.rebuild_db).await? {
                ingest::print_summary(&summary, cli.rebuild_db);
            }
            let pipeline = Arc::new(RagPipeline::new(
                Arc::new(store),
                Arc::new(OpenAiChat::new(
                    OpenAiClient::new(&cfg.openai)?,
                    cfg.openai.model.clone(),
                    cfg.openai.temperature,
                )),
                cfg.retrieval.k,
                cfg.retrieval.history_turns,
            ));

            if cli.mode == Mode::Cli {
                let stdin = std::io::stdin();
                let mut stdout = std::io::stdout();
                repl::run_repl(
                    &pipeline,
                    cfg.retrieval.history_turns,
                    stdin.lock(),
                    &mut stdout,
                )
                .await?;
            } else {
                server::run_server(&cfg.server, pipeline.clone(), !cli.no_browser).await?;
            }
            pipeline.store().close().await;
            return Ok(());
        }
    }

    store.close().await;
    Ok(())
}

async fn open_store(cfg: &Config) -> Result<VectorStore> {
    let embedder = OpenAiEmbedder::new(
        OpenAiClient::new(&cfg.openai)?,
        cfg.openai.embedding_model.clone(),
    );
    VectorStore::open(&cfg.store, Arc::new(embedder), cfg.openai.batch_size).await
}

async fn run_search(store: &VectorStore, query: &str, k: usize) -> Result<()> {
    let results = store.query(query, k).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}#{} ({})",
            i + 1,
            r.score,
            r.source_path,
            r.chunk_index,
            r.doc_type
        );
        let preview: String = r.text.chars().take(200).collect();
        println!("    {}", preview.replace('\n', " ").trim());
        println!();
    }
    Ok(())
}

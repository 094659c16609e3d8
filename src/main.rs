//! # docrag CLI
//!
//! Answers questions about a local directory of text documents with a
//! locally hosted language model.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag init` | Create the SQLite database and schema |
//! | `docrag reconcile` | Index documents not yet in the index |
//! | `docrag ask "<query>"` | Answer a question, streaming the response |
//! | `docrag prompt "<query>"` | Show the prompt `ask` would send |
//! | `docrag stats` | Show collection statistics |
//! | `docrag serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docrag::{ask, config, ingest, migrate, server, stats};

/// docrag: retrieval-augmented answers over a local document directory.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docrag.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docrag", version, about = "Retrieval-augmented answers over local documents")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docrag.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index every document in the directory that is not indexed yet.
    ///
    /// Documents are identified by file name; a file already in the index
    /// is skipped even if its content changed.
    Reconcile {
        /// Directory to scan instead of `documents.dir`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        query: String,

        /// Number of chunks to retrieve (default: `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Model id (default: `llm.model`).
        #[arg(long)]
        model: Option<String>,

        /// Wait for the whole answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,
    },

    /// Print the prompt `ask` would send, without calling the model.
    Prompt {
        query: String,

        #[arg(long)]
        k: Option<usize>,
    },

    /// Show collection statistics.
    Stats,

    /// Start the HTTP server on `server.bind`.
    Serve,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Reconcile { dir } => {
            ingest::run_reconcile(&cfg, dir).await?;
        }
        Commands::Ask {
            query,
            k,
            model,
            no_stream,
        } => {
            if k == Some(0) {
                anyhow::bail!("--k must be >= 1");
            }
            ask::run_ask(&cfg, &query, k, model.as_deref(), no_stream).await?;
        }
        Commands::Prompt { query, k } => {
            if k == Some(0) {
                anyhow::bail!("--k must be >= 1");
            }
            ask::run_prompt(&cfg, &query, k).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

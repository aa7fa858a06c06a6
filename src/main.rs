//! # Chat Recall CLI (`recall`)
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and run schema migrations |
//! | `recall import <file>` | Import a normalized conversation archive |
//! | `recall embed` | Embed conversations and messages not yet indexed |
//! | `recall search "<query>"` | Keyword, semantic or hybrid search |
//! | `recall ask "<question>"` | Answer from retrieved context via Ollama |
//! | `recall stats` | Show what is imported and embedded |

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chat_recall::ask::{self, AskArgs};
use chat_recall::progress::ProgressMode;
use chat_recall::search::{self, SearchArgs, SearchMode};
use chat_recall::{config, embed_cmd, ingest, migrate, stats};
use chat_recall_core::search::SearchFilters;

/// Hybrid search and grounded answers over your archive of past AI
/// conversations.
#[derive(Parser)]
#[command(name = "recall", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    /// Log verbosity on stderr (-v info, -vv debug). `RUST_LOG` wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import a conversation archive (JSON) and rebuild the full-text index.
    Import {
        /// Path to the archive file.
        file: PathBuf,
    },

    /// Embed conversation topics and assistant messages not yet indexed.
    Embed {
        /// Drop both vector collections and re-embed everything.
        #[arg(long)]
        force: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search the archive.
    Search {
        query: String,

        #[arg(long, value_enum, default_value = "hybrid")]
        mode: SearchMode,

        /// Number of results (defaults to `retrieval.n_results`).
        #[arg(long)]
        limit: Option<usize>,

        #[command(flatten)]
        filters: FilterArgs,

        /// Rerank hybrid candidates with the cross-encoder.
        #[arg(long)]
        rerank: bool,
    },

    /// Answer a question using retrieved conversations as context.
    Ask {
        question: String,

        /// Number of retrieved sources (defaults to `retrieval.n_results`).
        #[arg(long)]
        limit: Option<usize>,

        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long)]
        rerank: bool,
    },

    /// Show database and index statistics.
    Stats,
}

/// Attribute filters. They narrow semantic retrieval only.
#[derive(Args)]
struct FilterArgs {
    /// Only this source id (e.g. `claude`).
    #[arg(long)]
    source: Option<String>,

    /// Only this sender (`human` or `assistant`).
    #[arg(long)]
    sender: Option<String>,

    /// Created on or after this timestamp (ISO 8601).
    #[arg(long)]
    from: Option<String>,

    /// Created on or before this timestamp (ISO 8601).
    #[arg(long)]
    to: Option<String>,
}

impl From<FilterArgs> for SearchFilters {
    fn from(args: FilterArgs) -> Self {
        SearchFilters {
            source_id: args.source,
            sender: args.sender,
            date_from: args.from,
            date_to: args.to,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
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
        Commands::Import { file } => {
            ingest::run_import(&cfg, &file).await?;
        }
        Commands::Embed { force, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            embed_cmd::run_embed(&cfg, force, mode).await?;
        }
        Commands::Search {
            query,
            mode,
            limit,
            filters,
            rerank,
        } => {
            let args = SearchArgs {
                query,
                mode,
                limit,
                filters: filters.into(),
                rerank,
            };
            search::run_search(&cfg, args).await?;
        }
        Commands::Ask {
            question,
            limit,
            filters,
            rerank,
        } => {
            let args = AskArgs {
                question,
                limit,
                filters: filters.into(),
                rerank,
            };
            ask::run_ask(&cfg, args).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

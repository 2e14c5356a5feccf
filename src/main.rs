//! # KB Harness CLI (`kb`)
//!
//! Manage knowledge bases, ingest sources into them, and retrieve ranked
//! chunks or an assembled context block for a question.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb create <name>` | Create an empty knowledge base |
//! | `kb list` | List knowledge bases with their counts |
//! | `kb show <id>` | Show one knowledge base and its sources |
//! | `kb update <id>` | Change name or description |
//! | `kb delete <id>` | Delete a knowledge base |
//! | `kb add <id> --kind <kind>` | Ingest a file, inline text, or URL |
//! | `kb remove-source <id> <index>` | Remove a source and its chunks |
//! | `kb query <id> "<question>"` | Top-K relevant chunks |
//! | `kb context <id> "<question>"` | Token-budgeted context block |

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kb_harness::config::{load_config, Config};
use kb_harness::ingest::SourceInput;
use kb_harness::{bases, context, ingest, search};

const DEFAULT_CONFIG: &str = "./config/kb.toml";

/// KB Harness CLI: knowledge bases with chunked retrieval.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "KB Harness: ingest sources into knowledge bases and retrieve relevant context",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kb.toml`; built-in defaults are used when that
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty knowledge base.
    Create {
        name: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// List all knowledge bases.
    List,

    /// Show a knowledge base with its sources.
    Show {
        id: String,

        /// Also print every chunk.
        #[arg(long)]
        chunks: bool,
    },

    /// Change a knowledge base's name or description.
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a knowledge base with all sources and chunks.
    Delete { id: String },

    /// Add a source to a knowledge base.
    ///
    /// Exactly one of --file, --text, or --url supplies the material.
    #[command(group(ArgGroup::new("input").required(true).args(["file", "text", "url"])))]
    Add {
        id: String,

        /// Source kind: document-pdf, document-docx, plain-text, url,
        /// pasted-text (or pdf, docx, text, paste).
        #[arg(long)]
        kind: String,

        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long)]
        text: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// Display label; defaults to the file name or URL.
        #[arg(long)]
        label: Option<String>,
    },

    /// Remove a source by index. Later sources shift down by one.
    RemoveSource { id: String, index: usize },

    /// Print the most relevant chunks for a question.
    Query {
        id: String,
        question: String,

        /// Number of chunks to return (default: retrieval.top_k).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a token-budgeted context block for a question.
    Context {
        id: String,
        question: String,

        /// Token budget (default: retrieval.max_context_tokens).
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() {
                load_config(p)
            } else {
                Ok(Config::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Create { name, description } => {
            bases::run_create(&cfg, &name, &description).await?;
        }
        Commands::List => {
            bases::run_list(&cfg).await?;
        }
        Commands::Show { id, chunks } => {
            bases::run_show(&cfg, &id, chunks).await?;
        }
        Commands::Update {
            id,
            name,
            description,
        } => {
            bases::run_update(&cfg, &id, name, description).await?;
        }
        Commands::Delete { id } => {
            bases::run_delete(&cfg, &id).await?;
        }
        Commands::Add {
            id,
            kind,
            file,
            text,
            url,
            label,
        } => {
            let input = match (file, text, url) {
                (Some(path), _, _) => SourceInput::File(path),
                (_, Some(text), _) => SourceInput::Text(text),
                (_, _, Some(url)) => SourceInput::Url(url),
                _ => anyhow::bail!("One of --file, --text, or --url is required."),
            };
            ingest::run_add_source(&cfg, &id, &kind, input, label).await?;
        }
        Commands::RemoveSource { id, index } => {
            ingest::run_remove_source(&cfg, &id, index).await?;
        }
        Commands::Query {
            id,
            question,
            top_k,
            json,
        } => {
            search::run_query(&cfg, &id, &question, top_k, json).await?;
        }
        Commands::Context {
            id,
            question,
            max_tokens,
        } => {
            context::run_context(&cfg, &id, &question, max_tokens).await?;
        }
    }

    Ok(())
}

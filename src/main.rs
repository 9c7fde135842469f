//! # docask CLI
//!
//! Ask questions about one document at a time. Ingesting a file replaces
//! whatever was indexed before.
//!
//! ## Usage
//!
//! ```bash
//! docask --config ./config/docask.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docask ingest <file>` | Index a PDF, text, or CSV file as the active document |
//! | `docask ask "<question>"` | Answer a question from the active document |
//! | `docask retrieve "<query>"` | Show the chunks a question would be answered from |
//! | `docask status` | Show the active document |
//! | `docask reset` | Drop the active document |
//! | `docask serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! docask ingest ./handbook.pdf
//! docask ingest ./export.dat --type tabular
//! docask ask "What is the refund policy?"
//! docask retrieve "refund" --k 2
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docask::{commands, config, logging, server};
use docask::pipeline::Pipeline;

/// docask: answer questions strictly from the contents of one document.
#[derive(Parser)]
#[command(
    name = "docask",
    about = "Answer questions strictly from the contents of one document",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// See `config/docask.example.toml` for every setting.
    #[arg(long, global = true, default_value = "./config/docask.toml")]
    config: PathBuf,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a document, replacing the active one.
    ///
    /// On failure the previous document is dropped as well.
    Ingest {
        /// Path to a .pdf, .txt, or .csv file.
        path: PathBuf,

        /// Declared type: `pdf`, `text`, or `tabular`. Inferred from the
        /// extension when omitted.
        #[arg(long = "type")]
        doc_type: Option<String>,
    },

    /// Answer a question from the active document.
    Ask {
        question: String,

        /// Number of chunks to use as context (default: retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Print the chunks most similar to a query, with scores.
    Retrieve {
        query: String,

        #[arg(long)]
        k: Option<usize>,
    },

    /// Show the active document.
    Status,

    /// Drop the active document and delete its index.
    Reset,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Serve = cli.command {
        return server::run_server(&cfg).await;
    }

    let pipeline = Pipeline::from_config(&cfg).await?;
    match cli.command {
        Commands::Ingest { path, doc_type } => {
            commands::run_ingest(&pipeline, &path, doc_type.as_deref()).await?;
        }
        Commands::Ask { question, k } => {
            commands::run_ask(&pipeline, &question, k).await?;
        }
        Commands::Retrieve { query, k } => {
            commands::run_retrieve(&pipeline, &query, k).await?;
        }
        Commands::Status => {
            commands::run_status(&pipeline).await?;
        }
        Commands::Reset => {
            commands::run_reset(&pipeline).await?;
        }
        Commands::Serve => {}
    }

    Ok(())
}

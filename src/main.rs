//! # Retail Analyst CLI (`analyst`)
//!
//! ## Usage
//!
//! ```bash
//! analyst --config ./config/analyst.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyst ask "<question>"` | Answer one question and print its record |
//! | `analyst batch --batch in.jsonl --out out.jsonl` | Answer a JSON-lines file |
//! | `analyst search "<query>"` | Rank documentation chunks |
//! | `analyst schema` | Print table DDL |
//! | `analyst sql "<sql>"` | Execute SQL through the gateway |
//! | `analyst serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use retail_analyst::progress::ProgressMode;
use retail_analyst::{ask, batch, config, inspect, logging, search, server};

/// Retail Analyst: answers business questions from documentation and a
/// SQLite database.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/analyst.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "analyst",
    about = "Retail Analyst: hybrid documentation + SQL question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/analyst.toml")]
    config: PathBuf,

    /// Log pipeline activity at info level (overridden by `ANALYST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question.
    ///
    /// Prints the answer record (id, final_answer, sql, confidence,
    /// explanation, citations) as JSON.
    Ask {
        question: String,

        /// Expected answer shape: `int`, `float`, `str`, `json`, or a
        /// structural hint such as `{category:str, quantity:int}`.
        #[arg(long)]
        format_hint: Option<String>,

        /// Record id; a fresh UUID when omitted.
        #[arg(long)]
        id: Option<String>,

        /// Also print the full pipeline state, including the node trace.
        #[arg(long)]
        trace: bool,
    },

    /// Answer every question in a JSON-lines file.
    ///
    /// Writes one record per non-blank input line, in input order.
    Batch {
        /// Input file: one `{"id", "question", "format_hint"}` object per line.
        #[arg(long)]
        batch: PathBuf,

        /// Output file for the answer records.
        #[arg(long)]
        out: PathBuf,

        /// Number of questions answered concurrently.
        #[arg(long, default_value_t = 1)]
        jobs: usize,

        /// Progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Rank documentation chunks for a query.
    Search {
        query: String,

        /// Number of chunks to return (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Print `CREATE TABLE` statements.
    Schema {
        /// Restrict to these tables; repeatable.
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Execute SQL through the gateway and print the result as JSON.
    Sql { sql: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ask {
            question,
            format_hint,
            id,
            trace,
        } => {
            ask::run_ask(&cfg, &question, format_hint, id, trace).await?;
        }
        Commands::Batch {
            batch: input,
            out,
            jobs,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            batch::run_batch(&cfg, &input, &out, jobs, progress).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k)?;
        }
        Commands::Schema { tables } => {
            inspect::run_schema(&cfg, &tables).await?;
        }
        Commands::Sql { sql } => {
            inspect::run_sql(&cfg, &sql).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

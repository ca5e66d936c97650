//! # food-etl CLI
//!
//! ## Usage
//!
//! ```bash
//! food-etl --config ./config/food-etl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `food-etl init` | Create the SQLite database and schema |
//! | `food-etl run [CODES...]` | Fetch, normalize, and load products |
//! | `food-etl get <code>` | Print a stored product with its associations |
//! | `food-etl stats` | Row counts and last load time |
//!
//! Logs go to stderr through `tracing`; set `RUST_LOG` to override the
//! default `info` level (`debug` with `-v`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use food_etl::progress::ProgressMode;
use food_etl::{config, get, migrate, pipeline, stats};

/// food-etl: Open Food Facts → SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/food-etl.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "food-etl",
    about = "Extract products from Open Food Facts, normalize them, and load them into SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/food-etl.toml")]
    config: PathBuf,

    /// Debug-level logging (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and every table. Safe to run
    /// repeatedly.
    Init,

    /// Run the ETL over a list of product codes.
    ///
    /// Codes come from the command line, else `--codes-file`, else
    /// `[pipeline].codes` in the config file. Each code is loaded in its
    /// own transaction; a failing code does not stop the run.
    Run {
        /// Product codes (barcodes) to load.
        codes: Vec<String>,

        /// File with one code per line; `#` starts a comment.
        #[arg(long)]
        codes_file: Option<PathBuf>,

        /// Fetch and transform only; write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Print a stored product by code.
    Get {
        /// Product code.
        code: String,

        /// Print as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s).ok_or_else(|| format!("invalid progress mode '{}' (off|human|json)", s))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "food_etl=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    // Every command opens db.url; placeholders must not create a database.
    cfg.ensure_runnable()?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            codes,
            codes_file,
            dry_run,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            pipeline::run_cmd(&cfg, codes, codes_file.as_deref(), dry_run, mode).await?;
        }
        Commands::Get { code, json } => {
            get::run_get(&cfg, &code, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

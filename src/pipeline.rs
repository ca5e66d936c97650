//! ETL run orchestration.
//!
//! Processes product codes one at a time:
//!
//! ```text
//! fetch ──▶ transform ──▶ BEGIN ──▶ load ──▶ COMMIT
//!   │           │                    │
//!   ▼           ▼                    ▼
//! rejected   rejected            ROLLBACK, failed
//! ```
//!
//! Fetch and transform failures never open a transaction. A load failure
//! rolls back everything written for that code. No per-code failure stops
//! the run; the [`RunSummary`] lists which codes made it and why the others
//! did not.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::error::EtlError;
use crate::fetch::{Fetcher, OffClient};
use crate::load::{load, LoadReport};
use crate::migrate;
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::transform::transform;

/// Where in the per-code sequence a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Transform,
    /// Opening the per-code transaction.
    Begin,
    Load,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Transform => "transform",
            Stage::Begin => "begin",
            Stage::Load => "load",
            Stage::Commit => "commit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub code: String,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub succeeded: Vec<String>,
    pub failed: Vec<Failure>,
    /// Nutrient unit conflicts seen across all committed loads.
    pub unit_conflicts: u64,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn failed_codes(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.code.as_str()).collect()
    }

    fn log(&self) {
        info!(
            total = self.total(),
            succeeded = self.succeeded.len(),
            failed = self.failed.len(),
            dry_run = self.dry_run,
            "ETL run finished"
        );
        if !self.succeeded.is_empty() {
            info!(codes = %self.succeeded.join(", "), "succeeded");
        }
        if !self.failed.is_empty() {
            warn!(codes = %self.failed_codes().join(", "), "failed");
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Fetch and transform only; open no transactions.
    pub dry_run: bool,
}

/// Run the pipeline over `codes` on an already-open connection.
///
/// Each code gets its own transaction on `conn`. The connection itself is
/// left open for the caller to release.
pub async fn run(
    conn: &mut SqliteConnection,
    fetcher: &dyn Fetcher,
    codes: &[String],
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> RunSummary {
    let mut summary = RunSummary {
        dry_run: options.dry_run,
        ..RunSummary::default()
    };
    let total = codes.len() as u64;
    info!(total, dry_run = options.dry_run, "ETL run starting");

    for (i, code) in codes.iter().enumerate() {
        progress.report(ProgressEvent::Started {
            code: code.clone(),
            n: i as u64 + 1,
            total,
        });
        info!(code = %code, "processing product code");

        match process_code(conn, fetcher, code, options.dry_run).await {
            Ok(report) => {
                if let Some(report) = report {
                    summary.unit_conflicts += report.unit_conflicts.len() as u64;
                }
                summary.succeeded.push(code.clone());
                progress.report(ProgressEvent::Succeeded { code: code.clone() });
            }
            Err((stage, err)) => {
                if err.is_rejection() {
                    warn!(code = %code, %stage, error = %err, "product rejected");
                } else {
                    error!(code = %code, %stage, error = %err, "product failed");
                }
                summary.failed.push(Failure {
                    code: code.clone(),
                    stage,
                    reason: err.to_string(),
                });
                progress.report(ProgressEvent::Failed {
                    code: code.clone(),
                    stage,
                });
            }
        }
    }

    summary.log();
    summary
}

/// One code through fetch → transform → load. `Ok(None)` is a successful
/// dry run.
async fn process_code(
    conn: &mut SqliteConnection,
    fetcher: &dyn Fetcher,
    code: &str,
    dry_run: bool,
) -> std::result::Result<Option<LoadReport>, (Stage, EtlError)> {
    let raw = match fetcher.fetch(code).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Err((Stage::Fetch, EtlError::NotFound(code.to_string()))),
        Err(e) => return Err((Stage::Fetch, e)),
    };

    let record = transform(&raw, code).map_err(|e| (Stage::Transform, e))?;

    if dry_run {
        info!(
            code = %record.product.code,
            ingredients = record.ingredients.len(),
            nutrients = record.nutrients.len(),
            "dry run, not loading"
        );
        return Ok(None);
    }

    let mut tx = conn
        .begin()
        .await
        .map_err(|e| (Stage::Begin, EtlError::from(e)))?;

    match load(&mut tx, &record).await {
        Ok(report) => {
            if let Err(e) = tx.commit().await {
                // The dropped transaction rolls back on its own.
                error!(code, error = %e, "commit failed");
                return Err((Stage::Commit, EtlError::from(e)));
            }
            info!(code, "committed");
            Ok(Some(report))
        }
        Err(e) => {
            rollback(tx, code).await;
            Err((Stage::Load, e))
        }
    }
}

/// Best-effort rollback. A failure here is logged and swallowed.
async fn rollback(tx: Transaction<'_, Sqlite>, code: &str) {
    match tx.rollback().await {
        Ok(()) => warn!(code, "rolled back"),
        Err(e) => error!(code, error = %e, "rollback failed"),
    }
}

/// Own the session for a whole run: validate config, connect, make sure the
/// schema exists, run, then release the connection and close the pool
/// whatever the outcome.
pub async fn run_etl(
    config: &Config,
    codes: &[String],
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    config.ensure_runnable()?;

    if codes.is_empty() {
        warn!("no product codes to process");
        return Ok(RunSummary {
            dry_run: options.dry_run,
            ..RunSummary::default()
        });
    }

    let fetcher = OffClient::new(&config.api)?;
    let pool = db::connect(config).await?;

    let result = async {
        let mut conn = pool.acquire().await?;
        migrate::apply_schema(&mut conn).await?;
        let summary = run(&mut conn, &fetcher, codes, options, progress).await;
        Ok::<_, anyhow::Error>(summary)
    }
    .await;

    pool.close().await;
    result
}

/// Pick the codes for a run: command-line codes, else a codes file (one
/// per line, `#` starts a comment), else `[pipeline].codes` from config.
pub fn resolve_codes(
    config: &Config,
    cli_codes: Vec<String>,
    codes_file: Option<&Path>,
) -> Result<Vec<String>> {
    if !cli_codes.is_empty() {
        return Ok(clean_codes(cli_codes));
    }
    if let Some(path) = codes_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read codes file: {}", path.display()))?;
        let codes = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default().to_string())
            .collect();
        return Ok(clean_codes(codes));
    }
    Ok(clean_codes(config.pipeline.codes.clone()))
}

fn clean_codes(codes: Vec<String>) -> Vec<String> {
    codes
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// CLI entry point for `food-etl run`.
pub async fn run_cmd(
    config: &Config,
    cli_codes: Vec<String>,
    codes_file: Option<&Path>,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    let codes = resolve_codes(config, cli_codes, codes_file)?;
    let reporter = progress.reporter();
    let summary = run_etl(config, &codes, &RunOptions { dry_run }, reporter.as_ref()).await?;

    if summary.dry_run {
        println!("run (dry-run)");
    } else {
        println!("run");
    }
    println!("  requested: {}", codes.len());
    println!("  succeeded: {}", summary.succeeded.len());
    println!("  failed: {}", summary.failed.len());
    for failure in &summary.failed {
        println!(
            "    {}  {}  {}",
            failure.code, failure.stage, failure.reason
        );
    }
    if summary.unit_conflicts > 0 {
        println!("  unit conflicts: {}", summary.unit_conflicts);
    }
    println!("ok");

    Ok(())
}

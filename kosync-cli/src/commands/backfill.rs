//! Backfill command implementation.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use colored::Colorize;
use kosync_server::{
    BackfillError, BackfillOptions, BackfillProcess, BackfillReport, Config, FilesystemLibrary,
};
use tracing::info;

use crate::utils::Context;

fn print_report(report: &BackfillReport) {
    println!("   {} {}", "Processed:".dimmed(), report.processed);
    println!("   {} {}", "Succeeded:".dimmed(), report.succeeded.to_string().green());
    if report.failed > 0 {
        println!("   {} {}", "Failed:".dimmed(), report.failed.to_string().yellow());
    } else {
        println!("   {} {}", "Failed:".dimmed(), report.failed);
    }
    println!("   {} {}", "Batches:".dimmed(), report.batches);
}

/// Execute the backfill command.
pub async fn execute(
    ctx: &Context,
    owner: Option<String>,
    force: bool,
    batch_size: Option<u64>,
) -> Result<()> {
    let db = ctx.connect().await?;
    let root = ctx.library_root();
    let library = Arc::new(FilesystemLibrary::new(root.clone(), db.documents.clone()));

    let batch_size = batch_size
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_else(|| Config::from_env().backfill_batch_size);

    info!(root = %root.display(), ?owner, force, batch_size, "Starting backfill");

    let process = BackfillProcess::new(db, library);
    let result = process
        .run(BackfillOptions {
            owner,
            force,
            batch_size,
        })
        .await;

    match result {
        Ok(report) => {
            if !ctx.quiet {
                println!("{}", "Backfill complete".green().bold());
                print_report(&report);
            }
            Ok(())
        }
        Err(BackfillError::BatchFailed { report, source }) => {
            if !ctx.quiet {
                println!("{}", "Backfill halted".red().bold());
                print_report(&report);
            }
            Err(BackfillError::BatchFailed { report, source }).context("Backfill failed")
        }
        Err(e) => Err(e).context("Backfill failed"),
    }
}

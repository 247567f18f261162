//! Prune command implementation.

use anyhow::{Context as _, Result};
use colored::Colorize;
use kosync_server::DocumentCleanup;
use tracing::info;

use crate::utils::{require_user, Context};

/// Execute the prune command.
pub async fn execute(ctx: &Context, username: String) -> Result<()> {
    let db = ctx.connect().await?;
    let user = require_user(&db, &username).await?;

    let report = DocumentCleanup::new(&db)
        .prune_stale_mappings(user.id)
        .await
        .context("Prune failed")?;

    info!(
        owner = user.id,
        removed = report.mappings_removed,
        "Pruned stale mappings"
    );

    if !ctx.quiet {
        println!("{}", "Prune complete".green().bold());
        println!("   {} {}", "Documents checked:".dimmed(), report.documents_checked);
        println!("   {} {}", "Documents skipped:".dimmed(), report.documents_skipped);
        println!("   {} {}", "Mappings removed:".dimmed(), report.mappings_removed);
    }
    Ok(())
}

//! Progress command implementation.

use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use kosync_server::document_progress;
use kosync_server::protocol::ProgressResponse;

use crate::utils::{format_timestamp, require_user, Context};

/// Execute the progress command.
pub async fn execute(ctx: &Context, username: String, document_id: i64, json: bool) -> Result<()> {
    let db = ctx.connect().await?;
    let user = require_user(&db, &username).await?;

    let document = db
        .documents
        .get(user.id, document_id)
        .await
        .context("Failed to load document")?
        .with_context(|| format!("Document {document_id} not found for {username}"))?;

    let Some(record) = document_progress(&db.mappings, &db.progress, user.id, document.id)
        .await
        .context("Failed to load progress")?
    else {
        bail!("No progress recorded for {}", document.path);
    };

    let updated_at = record.updated_at;
    let response = ProgressResponse::from(record);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if !ctx.quiet {
        println!("{} {}", "Document:".dimmed(), document.path);
        println!("{} {}", "Fingerprint:".dimmed(), response.document);
        println!("{} {}%", "Percentage:".dimmed(), response.percentage.green());
        println!("{} {}", "Progress:".dimmed(), response.progress);
        println!("{} {}", "Device:".dimmed(), response.device);
        println!("{} {}", "Updated:".dimmed(), format_timestamp(updated_at));
    }
    Ok(())
}

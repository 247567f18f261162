//! Fingerprint command implementation.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use colored::Colorize;
use kosync_core::{compute_content_fingerprint, name_fingerprint_of_path};
use tracing::info;

use crate::utils::Context;

/// Execute the fingerprint command.
pub async fn execute(ctx: &Context, file: PathBuf, json: bool) -> Result<()> {
    let mut source = tokio::fs::File::open(&file)
        .await
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let size = source
        .metadata()
        .await
        .with_context(|| format!("Failed to read file: {}", file.display()))?
        .len();

    let content = compute_content_fingerprint(&mut source, size)
        .await
        .with_context(|| format!("Cannot fingerprint contents of {}", file.display()))?;
    let name = name_fingerprint_of_path(&file)
        .with_context(|| format!("Cannot fingerprint name of {}", file.display()))?;

    info!(path = %file.display(), bytes = size, "Computed fingerprints");

    if json {
        let output = serde_json::json!({
            "file": file.display().to_string(),
            "size": size,
            "content": content.as_str(),
            "name": name.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !ctx.quiet {
        println!("{} {}", "File:".dimmed(), file.display());
        println!("{} {}", "Content:".dimmed(), content.as_str().green());
        println!("{} {}", "Name:".dimmed(), name.as_str().green());
    }

    Ok(())
}

//! Example showing which windows a content fingerprint samples.
//!
//! Run with: cargo run -p kosync-core --example fingerprint_tracing -- <FILE>

use kosync_core::{content_fingerprint_of_file, name_fingerprint_of_path, SAMPLE_OFFSETS};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::new("kosync_core=debug,info"))
        .with_target(true)
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: fingerprint_tracing <FILE>");
        return;
    };

    let size = match std::fs::metadata(&path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            eprintln!("Failed to stat {}: {}", path, e);
            return;
        }
    };

    println!("=== Fingerprint Demo ===\n");
    println!("File: {} ({} bytes)", path, size);
    let sampled: Vec<_> = SAMPLE_OFFSETS.iter().filter(|&&o| o < size).collect();
    println!("Windows sampled: {} at offsets {:?}\n", sampled.len(), sampled);

    match content_fingerprint_of_file(&path).await {
        Ok(fingerprint) => println!("content: {}", fingerprint),
        Err(e) => println!("content: unavailable ({})", e),
    }

    match name_fingerprint_of_path(&path) {
        Ok(fingerprint) => println!("name:    {}", fingerprint),
        Err(e) => println!("name:    unavailable ({})", e),
    }
}

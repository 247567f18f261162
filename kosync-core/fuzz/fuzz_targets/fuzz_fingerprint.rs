#![no_main]

//! Fuzz target for content and name fingerprinting
//!
//! Arbitrary bytes are fingerprinted both as file content (with the true size
//! and with an overstated size) and as a filename. None of these may panic.
//!
//! Run with: cargo +nightly fuzz run fuzz_fingerprint

use std::io::Cursor;

use kosync_core::{compute_content_fingerprint, compute_name_fingerprint};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let mut cursor = Cursor::new(data);
        if let Ok(fingerprint) = compute_content_fingerprint(&mut cursor, data.len() as u64).await {
            assert!(fingerprint.is_well_formed());
        }

        let mut cursor = Cursor::new(data);
        let _ = compute_content_fingerprint(&mut cursor, u64::MAX).await;
    });

    let name = String::from_utf8_lossy(data);
    let _ = compute_name_fingerprint(&name);
});

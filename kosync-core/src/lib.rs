//! KOSync Core - document fingerprinting for KOReader progress synchronization
//!
//! KOReader identifies a document by a fingerprint it computes locally rather
//! than by a server-issued ID. This crate reproduces both derivations so a
//! server can recognise the fingerprints a client presents.
//!
//! # Example
//!
//! ```no_run
//! use kosync_core::{compute_name_fingerprint, content_fingerprint_of_file};
//!
//! # async fn example() -> kosync_core::Result<()> {
//! let content = content_fingerprint_of_file("library/alice/book.epub").await?;
//! let name = compute_name_fingerprint("book.epub")?;
//! println!("content={content} name={name}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fingerprint;

pub use error::{FingerprintError, Result};
pub use fingerprint::{
    compute_content_fingerprint, compute_name_fingerprint, content_fingerprint_of_bytes,
    content_fingerprint_of_file, name_fingerprint_of_path, ByteSource, Fingerprint,
    FingerprintKind, FINGERPRINT_LEN, SAMPLE_OFFSETS, SAMPLE_SIZE,
};

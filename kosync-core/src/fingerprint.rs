//! Document fingerprints as computed by the KOReader client.
//!
//! Two derivations exist for every document:
//!
//! - **content**: MD5 over up to twelve 1 KiB windows sampled at fixed,
//!   exponentially spaced offsets. Fast on very large files, but only a
//!   heuristic: bytes outside the windows do not contribute.
//! - **name**: MD5 of the bare filename, case-sensitive.
//!
//! Both must stay bit-compatible with the client, which computes the same
//! values independently on every device.

use std::fmt;
use std::io::SeekFrom;
use std::path::Path;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::error::{FingerprintError, Result};

/// Size of each sampled window in bytes.
pub const SAMPLE_SIZE: u64 = 1024;

/// Offsets sampled for the content fingerprint, in sampling order.
pub const SAMPLE_OFFSETS: [u64; 12] = [
    0,
    1024,
    4096,
    16384,
    65536,
    262144,
    1048576,
    4194304,
    16777216,
    67108864,
    268435456,
    1073741824,
];

/// Length of a well-formed fingerprint (hex-encoded MD5).
pub const FINGERPRINT_LEN: usize = 32;

/// Seekable byte stream a content fingerprint can be computed from.
pub trait ByteSource: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T> ByteSource for T where T: AsyncRead + AsyncSeek + Unpin + Send {}

/// A document fingerprint.
///
/// Values computed by this crate are always 32 lowercase hex characters.
/// Values received from clients are carried verbatim: the sync protocol keys
/// progress on whatever document identifier the client presents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a client-supplied identifier without validation.
    pub fn from_client(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parse a fingerprint, requiring the 32-character lowercase hex form.
    pub fn parse(value: &str) -> Result<Self> {
        let fingerprint = Self(value.to_string());
        if fingerprint.is_well_formed() {
            Ok(fingerprint)
        } else {
            Err(FingerprintError::InvalidFingerprint(value.to_string()))
        }
    }

    fn from_digest(data: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this looks like a digest this crate could have produced.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == FINGERPRINT_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which derivation produced a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintKind {
    Content,
    Name,
}

impl FingerprintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Name => "name",
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FingerprintKind {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "content" => Ok(Self::Content),
            "name" => Ok(Self::Name),
            other => Err(FingerprintError::UnknownKind(other.to_string())),
        }
    }
}

/// Compute the content fingerprint of a seekable byte source.
///
/// Windows are read in offset order. Sampling stops at the first offset at or
/// beyond `total_size`, and at the first seek or read that fails or yields no
/// bytes, so smaller files contribute fewer windows. The digest covers the
/// concatenation of every window read.
///
/// Returns [`FingerprintError::NoSamples`] if not a single byte was read.
pub async fn compute_content_fingerprint<R>(source: &mut R, total_size: u64) -> Result<Fingerprint>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let mut buffer = Vec::new();

    for &offset in SAMPLE_OFFSETS.iter() {
        if offset >= total_size {
            break;
        }

        match read_window(source, offset).await {
            Ok(window) if !window.is_empty() => buffer.extend_from_slice(&window),
            Ok(_) => break,
            Err(e) => {
                tracing::debug!(offset, error = %e, "Stopped sampling after failed read");
                break;
            }
        }
    }

    if buffer.is_empty() {
        return Err(FingerprintError::NoSamples);
    }

    Ok(Fingerprint::from_digest(&buffer))
}

async fn read_window<R>(source: &mut R, offset: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    source.seek(SeekFrom::Start(offset)).await?;

    let mut window = Vec::with_capacity(SAMPLE_SIZE as usize);
    (&mut *source).take(SAMPLE_SIZE).read_to_end(&mut window).await?;
    Ok(window)
}

/// Compute the content fingerprint of an in-memory buffer.
pub async fn content_fingerprint_of_bytes(data: &[u8]) -> Result<Fingerprint> {
    let mut cursor = std::io::Cursor::new(data);
    compute_content_fingerprint(&mut cursor, data.len() as u64).await
}

/// Compute the content fingerprint of a file on disk.
pub async fn content_fingerprint_of_file(path: impl AsRef<Path>) -> Result<Fingerprint> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let size = file.metadata().await?.len();
    compute_content_fingerprint(&mut file, size).await
}

/// Compute the name fingerprint: MD5 of the name exactly as given.
pub fn compute_name_fingerprint(name: &str) -> Result<Fingerprint> {
    if name.is_empty() {
        return Err(FingerprintError::EmptyName);
    }
    Ok(Fingerprint::from_digest(name.as_bytes()))
}

/// Compute the name fingerprint of the final component of `path`.
pub fn name_fingerprint_of_path(path: impl AsRef<Path>) -> Result<Fingerprint> {
    let name = path
        .as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(FingerprintError::EmptyName)?;
    compute_name_fingerprint(name)
}

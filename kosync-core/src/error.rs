use thiserror::Error;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("No bytes could be sampled from the source")]
    NoSamples,

    #[error("Cannot fingerprint an empty name")]
    EmptyName,

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Unknown fingerprint kind: {0}")]
    UnknownKind(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FingerprintError>;

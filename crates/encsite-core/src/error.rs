use std::time::Duration;

use thiserror::Error;

pub type EncsiteResult<T> = Result<T, EncsiteError>;

/// Failure taxonomy shared by every encsite crate.
///
/// Crate-level error enums convert into this type at API boundaries where
/// callers only need to know which family a failure belongs to.
#[derive(Debug, Error)]
pub enum EncsiteError {
    /// Bad magic or IV length: a corrupt or foreign file
    #[error("format error: {0}")]
    Format(String),

    /// AEAD tag mismatch: wrong key or tampered data (not distinguishable)
    #[error("decryption failed: invalid key or corrupted asset")]
    Crypto,

    #[error("transport timeout after {0:?}")]
    TransportTimeout(Duration),

    #[error("upstream fetch failed for {path}: {reason}")]
    UpstreamFetch { path: String, reason: String },

    #[error("auth flow error: {0}")]
    AuthFlow(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EncsiteError {
    /// True for failures that mean the key in hand cannot open the asset.
    pub fn is_key_failure(&self) -> bool {
        matches!(self, EncsiteError::Crypto)
    }
}

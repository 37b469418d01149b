use std::time::Duration;

use encsite_core::EncsiteError;
use thiserror::Error;

/// Ciphertext could not be obtained from the asset source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("encrypted asset not found: {path}")]
    NotFound { path: String },

    #[error("encrypted asset unreachable: {path}: {reason}")]
    Unreachable { path: String, reason: String },
}

/// Failures on the page ↔ engine message channel.
///
/// None of these is a statement about the engine's key state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no reply from engine within {0:?}")]
    Timeout(Duration),

    #[error("engine inbox closed")]
    Disconnected,

    #[error("engine dropped the reply port")]
    NoReply,

    #[error("unexpected reply from engine: {0}")]
    UnexpectedReply(String),

    #[error("engine rejected the key")]
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Installed but never left the waiting phase
    #[error("engine installed but not activated")]
    NotActivated,

    #[error("engine registration timed out after {0:?}")]
    Timeout(Duration),
}

impl From<UpstreamError> for EncsiteError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::NotFound { path } => EncsiteError::UpstreamFetch {
                path,
                reason: "not found".into(),
            },
            UpstreamError::Unreachable { path, reason } => {
                EncsiteError::UpstreamFetch { path, reason }
            }
        }
    }
}

impl From<TransportError> for EncsiteError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(d) => EncsiteError::TransportTimeout(d),
            other => EncsiteError::Other(anyhow::anyhow!(other)),
        }
    }
}

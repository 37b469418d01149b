use encsite_core::EncsiteError;
use encsite_crypto::CodecError;
use encsite_engine::UpstreamError;
use thiserror::Error;

/// Key acquisition failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFlowError {
    #[error("no authorization state found")]
    MissingState,

    #[error("state mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("no decryption key available for this user")]
    NoKeyForUser,

    #[error("key entry cancelled")]
    Cancelled,

    #[error("identity provider discovery failed: {0}")]
    Discovery(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("key API request failed: {0}")]
    KeyApi(String),

    #[error("storing the key failed: {0}")]
    Storage(String),

    #[error("invalid OAuth configuration: {0}")]
    Config(String),
}

/// Why a candidate key did not pass the probe decrypt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("cannot fetch probe asset: {0}")]
    ProbeUnavailable(#[from] UpstreamError),

    #[error("probe asset did not decrypt: {0}")]
    Rejected(#[from] CodecError),
}

impl From<AuthFlowError> for EncsiteError {
    fn from(e: AuthFlowError) -> Self {
        EncsiteError::AuthFlow(e.to_string())
    }
}

use encsite_core::EncsiteError;
use thiserror::Error;

/// Structural problems with an asset, detected before any decryption
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid encrypted file format: bad magic")]
    BadMagic,

    #[error("unsupported IV length: {0}")]
    UnsupportedIvLength(u8),

    #[error("asset truncated: {len} bytes, header needs {needed}")]
    Truncated { len: usize, needed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error(transparent)]
    Format(#[from] FormatError),

    /// GCM tag check failed. A wrong key and a corrupted or truncated
    /// ciphertext look the same here.
    #[error("decryption failed: invalid key or corrupted file")]
    Crypto,

    #[error("encryption failed")]
    Encrypt,
}

impl From<CodecError> for EncsiteError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Format(f) => EncsiteError::Format(f.to_string()),
            CodecError::Crypto => EncsiteError::Crypto,
            CodecError::Encrypt => EncsiteError::Other(anyhow::anyhow!("asset encryption failed")),
        }
    }
}

//! Key derivation: SHA-256 passphrase → AES-256 key

use aes_gcm::{Aes256Gcm, Key, KeyInit};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit AES-GCM key derived from a site passphrase.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct SiteKey {
    bytes: [u8; KEY_SIZE],
}

impl SiteKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub(crate) fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.bytes))
    }
}

impl Drop for SiteKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl PartialEq for SiteKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SiteKey {}

impl std::fmt::Debug for SiteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the AES-256 key for a passphrase: `SHA-256(UTF-8(passphrase))`.
///
/// Pure and unsalted: every asset sealed under one passphrase opens with the
/// same key.
pub fn derive_key(passphrase: &str) -> SiteKey {
    let digest = Sha256::digest(passphrase.as_bytes());
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&digest);
    SiteKey::from_bytes(bytes)
}

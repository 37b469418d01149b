//! Encryption manifest
//!
//! Optional audit record written next to the encrypted tree. It lists, per
//! file, the original and encrypted relative paths, both sizes, and a SHA-256
//! hash of the plaintext, plus a SHA-256 fingerprint of the passphrase so an
//! auditor can tell which key sealed the tree without holding it in the clear.
//! All hashes are lowercase hex.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Manifest format version
pub const MANIFEST_VERSION: &str = "1.0";

/// A single encrypted file in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the input root (forward slashes)
    pub original_path: String,
    /// Path relative to the output root (`original_path` + ".enc")
    pub encrypted_path: String,
    pub original_size: u64,
    /// Includes header and tag overhead
    pub encrypted_size: u64,
    /// SHA-256 of the plaintext (hex)
    pub original_hash: String,
}

impl ManifestEntry {
    pub fn new(original_path: &str, plaintext: &[u8], encrypted_size: u64) -> Self {
        Self {
            original_path: original_path.to_string(),
            encrypted_path: format!("{original_path}.enc"),
            original_size: plaintext.len() as u64,
            encrypted_size,
            original_hash: sha256_hex(plaintext),
        }
    }

    /// Check a decrypted payload against the recorded size and hash.
    pub fn verify_plaintext(&self, plaintext: &[u8]) -> anyhow::Result<()> {
        if plaintext.len() as u64 != self.original_size {
            anyhow::bail!(
                "{}: size mismatch (manifest {}, decrypted {})",
                self.original_path,
                self.original_size,
                plaintext.len()
            );
        }
        if !sha256_hex(plaintext).eq_ignore_ascii_case(&self.original_hash) {
            anyhow::bail!("{}: content hash mismatch", self.original_path);
        }
        Ok(())
    }
}

/// Manifest for one encrypted output tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionManifest {
    pub version: String,
    /// SHA-256 of the passphrase (hex)
    pub key_hash: String,
    pub files: Vec<ManifestEntry>,
}

impl EncryptionManifest {
    pub fn new(passphrase: &str) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            key_hash: key_fingerprint(passphrase),
            files: Vec::new(),
        }
    }

    /// True when `passphrase` is the one that sealed this tree.
    pub fn key_matches(&self, passphrase: &str) -> bool {
        self.key_hash == key_fingerprint(passphrase)
    }

    /// Serialize to pretty JSON bytes
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| anyhow::anyhow!("manifest serialization: {e}"))
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data).map_err(|e| anyhow::anyhow!("manifest deserialization: {e}"))
    }
}

fn key_fingerprint(passphrase: &str) -> String {
    sha256_hex(passphrase.as_bytes())
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_roundtrip() {
        let mut manifest = EncryptionManifest::new("site-key");
        manifest
            .files
            .push(ManifestEntry::new("index.html", b"<html></html>", 50));
        manifest
            .files
            .push(ManifestEntry::new("css/site.css", b"body{}", 43));

        let bytes = manifest.to_bytes().unwrap();
        let restored = EncryptionManifest::from_bytes(&bytes).unwrap();

        assert_eq!(restored.version, "1.0");
        assert_eq!(restored.files.len(), 2);
        assert_eq!(restored.files[1].encrypted_path, "css/site.css.enc");
        assert_eq!(restored.files[0].original_size, 13);
        assert!(restored.key_matches("site-key"));
        assert!(!restored.key_matches("other-key"));
    }

    #[test]
    fn test_key_hash_is_sha256_hex() {
        let manifest = EncryptionManifest::new("abc");
        assert_eq!(
            manifest.key_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let entry = ManifestEntry::new("a.txt", b"abc", 40);
        assert_eq!(
            entry.original_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_accepts_manifest_from_other_writer() {
        // written by a tool that hashes the same way, uppercase hex and all
        let json = br#"{
          "version": "1.0",
          "key_hash": "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
          "files": [{
            "original_path": "index.html",
            "encrypted_path": "index.html.enc",
            "original_size": 3,
            "encrypted_size": 40,
            "original_hash": "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
          }]
        }"#;
        let manifest = EncryptionManifest::from_bytes(json).unwrap();
        assert!(manifest.key_matches("abc"));
        assert!(manifest.files[0].verify_plaintext(b"abc").is_ok());
        assert!(manifest.files[0].verify_plaintext(b"abd").is_err());
    }

    #[test]
    fn test_verify_plaintext() {
        let entry = ManifestEntry::new("a.js", b"console.log(1)", 51);

        assert!(entry.verify_plaintext(b"console.log(1)").is_ok());
        assert!(entry
            .verify_plaintext(b"console.log(2)")
            .unwrap_err()
            .to_string()
            .contains("hash mismatch"));
        assert!(entry
            .verify_plaintext(b"console.log(10)")
            .unwrap_err()
            .to_string()
            .contains("size mismatch"));
    }
}

//! Post-build audit of an encrypted tree against its manifest

use std::path::Path;

use anyhow::{Context, Result};
use encsite_crypto::{decrypt_with_key, derive_key, EncryptionManifest};
use rayon::prelude::*;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checked: usize,
    /// (encrypted path, reason)
    pub failures: Vec<(String, String)>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Decrypt every manifest entry under `output` and compare size and hash.
///
/// A passphrase that does not match the manifest fingerprint is an error;
/// per-file problems are collected into the report.
pub fn verify_directory(output: &Path, passphrase: &str, manifest_name: &str) -> Result<VerifyReport> {
    let manifest_path = output.join(manifest_name);
    let data = std::fs::read(&manifest_path)
        .with_context(|| format!("reading manifest: {}", manifest_path.display()))?;
    let manifest = EncryptionManifest::from_bytes(&data)?;

    if !manifest.key_matches(passphrase) {
        anyhow::bail!("key does not match the manifest fingerprint");
    }

    let key = derive_key(passphrase);
    let failures: Vec<(String, String)> = manifest
        .files
        .par_iter()
        .filter_map(|entry| {
            let path = output.join(&entry.encrypted_path);
            let check = std::fs::read(&path)
                .map_err(|e| anyhow::anyhow!("read failed: {e}"))
                .and_then(|asset| {
                    decrypt_with_key(&key, &asset).map_err(|e| anyhow::anyhow!("{e}"))
                })
                .and_then(|plaintext| entry.verify_plaintext(&plaintext));
            match check {
                Ok(()) => None,
                Err(e) => {
                    warn!(path = %entry.encrypted_path, "verification failed: {e}");
                    Some((entry.encrypted_path.clone(), e.to_string()))
                }
            }
        })
        .collect();

    info!(
        checked = manifest.files.len(),
        failed = failures.len(),
        "verification complete"
    );
    Ok(VerifyReport {
        checked: manifest.files.len(),
        failures,
    })
}

//! Directory encryption

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use encsite_core::config::EncryptorConfig;
use encsite_crypto::{derive_key, encrypt_with_key, EncryptionManifest, ManifestEntry, SiteKey};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::collect::{collect_files, should_encrypt, CollectConfig};

/// Progress callback: (files done, files total, relative path)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EncryptOptions {
    /// Remove the output directory before writing
    pub clean: bool,
    /// Write an [`EncryptionManifest`] into the output root
    pub manifest: bool,
    pub collect: CollectConfig,
    pub manifest_name: String,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self::from_config(&EncryptorConfig::default())
    }
}

impl EncryptOptions {
    pub fn from_config(config: &EncryptorConfig) -> Self {
        Self {
            clean: false,
            manifest: false,
            collect: CollectConfig::from(config),
            manifest_name: config.manifest_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncryptSummary {
    pub files_encrypted: usize,
    /// Files found but not on the publish list
    pub files_skipped: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub manifest_path: Option<PathBuf>,
}

/// Seal every publishable file under `input` into `output`.
pub fn encrypt_directory(
    input: &Path,
    output: &Path,
    passphrase: &str,
    options: &EncryptOptions,
) -> Result<EncryptSummary> {
    encrypt_directory_with_progress(input, output, passphrase, options, None)
}

pub fn encrypt_directory_with_progress(
    input: &Path,
    output: &Path,
    passphrase: &str,
    options: &EncryptOptions,
    progress: Option<&ProgressFn>,
) -> Result<EncryptSummary> {
    if passphrase.is_empty() {
        anyhow::bail!("no encryption key provided");
    }
    if !input.is_dir() {
        anyhow::bail!("input is not a directory: {}", input.display());
    }

    if options.clean && output.exists() {
        ensure_safe_to_clean(input, output)?;
        info!(output = %output.display(), "cleaning output directory");
        std::fs::remove_dir_all(output)
            .with_context(|| format!("cleaning output: {}", output.display()))?;
    }
    std::fs::create_dir_all(output)
        .with_context(|| format!("creating output: {}", output.display()))?;

    let input = input
        .canonicalize()
        .with_context(|| format!("resolving input: {}", input.display()))?;
    let output_abs = output
        .canonicalize()
        .with_context(|| format!("resolving output: {}", output.display()))?;

    // an output nested in the input must not be fed back in
    let files = collect_files(&input, &options.collect)?;
    let (publish, skipped): (Vec<_>, Vec<_>) = files
        .into_iter()
        .filter(|p| !p.starts_with(&output_abs))
        .partition(|p| should_encrypt(p, &options.collect.extensions));
    for path in &skipped {
        debug!(path = %path.display(), "not on the publish list");
    }
    info!(
        found = publish.len(),
        skipped = skipped.len(),
        "files to encrypt"
    );

    let key = derive_key(passphrase);
    let total = publish.len() as u64;
    let done = AtomicU64::new(0);

    let entries = publish
        .par_iter()
        .map(|path| {
            let entry = encrypt_one(&key, &input, output, path)?;
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(cb) = progress {
                cb(n, total, &entry.original_path);
            }
            Ok(entry)
        })
        .collect::<Result<Vec<ManifestEntry>>>()?;

    let mut summary = EncryptSummary {
        files_encrypted: entries.len(),
        files_skipped: skipped.len(),
        bytes_in: entries.iter().map(|e| e.original_size).sum(),
        bytes_out: entries.iter().map(|e| e.encrypted_size).sum(),
        manifest_path: None,
    };

    if options.manifest {
        let mut manifest = EncryptionManifest::new(passphrase);
        manifest.files = entries;
        let path = output.join(&options.manifest_name);
        std::fs::write(&path, manifest.to_bytes()?)
            .with_context(|| format!("writing manifest: {}", path.display()))?;
        info!(path = %path.display(), "manifest written");
        summary.manifest_path = Some(path);
    }

    info!(
        files = summary.files_encrypted,
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        "encryption complete"
    );
    Ok(summary)
}

fn encrypt_one(key: &SiteKey, input: &Path, output: &Path, path: &Path) -> Result<ManifestEntry> {
    let rel = relative_path(input, path)?;
    let plaintext =
        std::fs::read(path).with_context(|| format!("reading: {}", path.display()))?;
    let sealed =
        encrypt_with_key(key, &plaintext).with_context(|| format!("encrypting: {rel}"))?;

    let dest = output.join(format!("{rel}.enc"));
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating dir: {}", parent.display()))?;
    }
    std::fs::write(&dest, &sealed).with_context(|| format!("writing: {}", dest.display()))?;
    debug!(path = %rel, size = plaintext.len(), "encrypted");

    Ok(ManifestEntry::new(&rel, &plaintext, sealed.len() as u64))
}

/// `path` relative to `root`, with forward slashes.
fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Refuse to wipe a directory that holds the input tree.
fn ensure_safe_to_clean(input: &Path, output: &Path) -> Result<()> {
    let input = input
        .canonicalize()
        .with_context(|| format!("resolving input: {}", input.display()))?;
    let output = output
        .canonicalize()
        .with_context(|| format!("resolving output: {}", output.display()))?;
    if input.starts_with(&output) {
        anyhow::bail!(
            "refusing to clean {}: it contains the input directory",
            output.display()
        );
    }
    Ok(())
}

//! Key lookup shared by every command that needs the site passphrase

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use secrecy::SecretString;
use tracing::debug;

use encsite_bootstrap::{CredentialStore, FileCredentialStore};
use encsite_core::SiteConfig;

/// Where to find the site passphrase; checked in field order
#[derive(Args, Debug, Default)]
pub struct KeyArgs {
    /// Encryption key string
    #[arg(long, short = 'k')]
    pub key: Option<String>,

    /// File containing the encryption key
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Environment variable containing the key
    #[arg(long, default_value = "ENCRYPTION_KEY")]
    pub key_env: String,
}

impl KeyArgs {
    pub fn resolve(&self) -> Result<SecretString> {
        self.lookup()?.context(
            "no encryption key provided\n\
             Use --key, --key-file, or set the ENCRYPTION_KEY environment variable.",
        )
    }

    /// Like [`resolve`](Self::resolve), falling back to the persisted credential.
    pub fn resolve_or_stored(&self, config: &SiteConfig) -> Result<SecretString> {
        if let Some(key) = self.lookup()? {
            return Ok(key);
        }
        let store = credential_store(config)?;
        store.load()?.with_context(|| {
            format!(
                "no encryption key provided and none stored in {}",
                store.path().display()
            )
        })
    }

    fn lookup(&self) -> Result<Option<SecretString>> {
        if let Some(key) = self.key.as_deref().filter(|k| !k.is_empty()) {
            debug!("key from --key");
            return Ok(Some(SecretString::from(key)));
        }
        if let Some(path) = &self.key_file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading key file: {}", path.display()))?;
            let key = content.trim();
            if !key.is_empty() {
                debug!(path = %path.display(), "key from file");
                return Ok(Some(SecretString::from(key)));
            }
        }
        match std::env::var(&self.key_env) {
            Ok(key) if !key.is_empty() => {
                debug!(var = %self.key_env, "key from environment");
                Ok(Some(SecretString::from(key)))
            }
            _ => Ok(None),
        }
    }
}

/// The credential file for this site: config value, else the user config dir.
pub fn credential_store(config: &SiteConfig) -> Result<FileCredentialStore> {
    let path = match &config.bootstrap.credential_file {
        Some(path) => expand_tilde(path),
        None => {
            let home = std::env::var("HOME").context("HOME not set; set bootstrap.credential_file")?;
            PathBuf::from(home)
                .join(".config/encsite")
                .join(format!("{}.json", config.bootstrap.credential_name))
        }
    };
    Ok(FileCredentialStore::new(
        path,
        &config.bootstrap.credential_name,
        config.bootstrap.credential_max_age_days,
    ))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

//! Persisted key credential
//!
//! The browser keeps the passphrase in a cookie valid for `max_age_days`.
//! [`FileCredentialStore`] gives non-browser hosts the same contract: one
//! named value with an expiry, written atomically. An expired or blank value
//! reads as absent.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub trait CredentialStore: Send + Sync {
    /// The persisted key, if present, unexpired and non-blank.
    fn load(&self) -> Result<Option<SecretString>>;
    fn store(&self, key: &SecretString) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

impl<C: CredentialStore> CredentialStore for std::sync::Arc<C> {
    fn load(&self) -> Result<Option<SecretString>> {
        self.as_ref().load()
    }

    fn store(&self, key: &SecretString) -> Result<()> {
        self.as_ref().store(key)
    }

    fn clear(&self) -> Result<()> {
        self.as_ref().clear()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    name: String,
    value: String,
    /// Unix seconds
    expires_at: u64,
}

pub struct FileCredentialStore {
    path: PathBuf,
    name: String,
    max_age: Duration,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, name: &str, max_age_days: u32) -> Self {
        Self {
            path: path.into(),
            name: name.to_string(),
            max_age: Duration::from_secs(u64::from(max_age_days) * 24 * 60 * 60),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<SecretString>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&self.path)
            .with_context(|| format!("reading credential: {}", self.path.display()))?;
        let stored: StoredCredential = serde_json::from_slice(&data)
            .with_context(|| format!("parsing credential: {}", self.path.display()))?;

        if stored.name != self.name {
            debug!(expected = %self.name, found = %stored.name, "credential name mismatch");
            return Ok(None);
        }
        if stored.expires_at <= now_secs() {
            debug!("credential expired");
            return Ok(None);
        }
        if stored.value.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(SecretString::from(stored.value)))
    }

    fn store(&self, key: &SecretString) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating credential dir: {}", parent.display()))?;
        }

        let stored = StoredCredential {
            name: self.name.clone(),
            value: key.expose_secret().to_string(),
            expires_at: now_secs() + self.max_age.as_secs(),
        };
        let json = serde_json::to_vec(&stored).context("serializing credential")?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)
            .with_context(|| format!("writing credential temp: {}", tmp_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("restricting credential: {}", tmp_path.display()))?;
        }
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming credential: {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("removing credential: {}", self.path.display()))
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<SecretString>>,
}

impl MemoryCredentialStore {
    pub fn with_key(key: &str) -> Self {
        Self {
            value: Mutex::new(Some(SecretString::from(key))),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<SecretString>> {
        let value = self
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(value
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .cloned())
    }

    fn store(&self, key: &SecretString) -> Result<()> {
        *self
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(key.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EncsiteError, EncsiteResult};

/// Top-level site configuration (loaded from encsite.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub site: SiteSection,
    pub engine: EngineConfig,
    pub transport: TransportConfig,
    pub bootstrap: BootstrapConfig,
    pub oauth: OAuthConfig,
    pub encryptor: EncryptorConfig,
    pub logging: LoggingConfig,
}

impl SiteConfig {
    pub fn from_toml_str(s: &str) -> EncsiteResult<Self> {
        toml::from_str(s).map_err(|e| EncsiteError::Config(e.to_string()))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> EncsiteResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| EncsiteError::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Where the site lives and the fixed paths the engine and bootstrap share
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    /// Origin the engine serves (scheme://host[:port])
    pub origin: String,
    /// Engine scope path (default: "/")
    pub scope: String,
    /// Entry document; decode failures on markup redirect here
    pub entry_path: String,
    /// Directory prefix holding ciphertext counterparts
    pub enc_root: String,
    /// Bootstrap script injected into every decrypted document
    pub bootstrap_script: String,
    /// The engine's own script
    pub engine_script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Infrastructure paths that are always served as-is
    pub plain_paths: Vec<String>,
    /// Site pages deliberately published without encryption
    pub plain_pages: Vec<String>,
    /// File extensions (without dot) the engine decrypts
    pub intercept_extensions: Vec<String>,
    /// Path prefixes the engine decrypts regardless of extension
    pub asset_prefixes: Vec<String>,
    /// Cache-Control max-age for decrypted responses
    pub cache_max_age_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// PING reply timeout (default: 5000)
    pub ping_timeout_ms: u64,
    /// KEY_SET confirmation timeout (default: 3000)
    pub key_confirm_timeout_ms: u64,
    /// Engine registration timeout (default: 10000)
    pub registration_timeout_ms: u64,
    /// Engine inbox capacity
    pub channel_capacity: usize,
}

impl TransportConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn key_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.key_confirm_timeout_ms)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Name of the persisted key credential
    pub credential_name: String,
    /// Credential lifetime in days (default: 30)
    pub credential_max_age_days: u32,
    /// File backing the credential store (CLI/desktop hosts)
    pub credential_file: Option<PathBuf>,
    /// Query parameter set by the OAuth callback page
    pub redirect_marker: String,
    /// Delay before the forced content load after an OAuth round trip
    pub oauth_reload_delay_ms: u64,
    /// Delay before the controlled same-URL navigation
    pub reload_delay_ms: u64,
    /// Content path test-decrypted to verify a key before trusting it
    pub probe_path: String,
}

impl BootstrapConfig {
    pub fn oauth_reload_delay(&self) -> Duration {
        Duration::from_millis(self.oauth_reload_delay_ms)
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }
}

/// OAuth/PKCE client settings for the key acquisition flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Callback page (default: {origin}/oauth/callback.html)
    pub redirect_uri: Option<String>,
    pub scope: String,
    pub discovery_url: String,
    pub key_api_url: String,
    pub code_verifier_length: usize,
    pub state_length: usize,
    pub nonce_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptorConfig {
    /// File extensions (with dot) that get encrypted
    pub extensions: Vec<String>,
    /// Glob patterns matched against file and directory names
    pub exclude_patterns: Vec<String>,
    /// Manifest file name written into the output root
    pub manifest_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".into(),
            scope: "/".into(),
            entry_path: "/index.html".into(),
            enc_root: "enc".into(),
            bootstrap_script: "/bootstrap.js".into(),
            engine_script: "/sw.js".into(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plain_paths: [
                "/sw.js",
                "/oauth/callback.html",
                "/oauth-config.js",
                "/oauth.js",
                "/crypto.js",
                "/bootstrap.js",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            plain_pages: Vec::new(),
            intercept_extensions: [
                "html", "css", "js", "json", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico",
                "woff", "woff2", "ttf",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            asset_prefixes: vec!["/assets/".into(), "/img/".into()],
            cache_max_age_secs: 3600,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_timeout_ms: 5000,
            key_confirm_timeout_ms: 3000,
            registration_timeout_ms: 10000,
            channel_capacity: 32,
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            credential_name: "dec_key".into(),
            credential_max_age_days: 30,
            credential_file: None,
            redirect_marker: "oauth_success".into(),
            oauth_reload_delay_ms: 500,
            reload_delay_ms: 100,
            probe_path: "/index.html".into(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: "encsite-client".into(),
            redirect_uri: None,
            scope: "openid profile email".into(),
            discovery_url: "/oidc/.well-known/openid-configuration".into(),
            key_api_url: "/key/api/application-key/info".into(),
            code_verifier_length: 128,
            state_length: 32,
            nonce_length: 32,
        }
    }
}

impl Default for EncryptorConfig {
    fn default() -> Self {
        Self {
            extensions: [
                ".html", ".css", ".js", ".json", ".png", ".jpg", ".jpeg", ".svg", ".webp",
                ".woff", ".woff2", ".ttf", ".ico",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            exclude_patterns: vec![".*".into(), "node_modules".into()],
            manifest_name: "manifest.json".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

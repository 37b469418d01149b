//! The interception engine
//!
//! One engine serves one origin. It is `Send + Sync` and meant to be shared
//! behind an `Arc`; concurrent fetches read the key independently and a
//! decode failure clears it for everyone.

use bytes::Bytes;
use encsite_core::{EncsiteError, EncsiteResult, SiteConfig};
use encsite_crypto::{decrypt, encrypted_path_for, mime_type_of};
use http::{HeaderValue, Response};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use url::Url;

use crate::inject::inject_bootstrap;
use crate::lifecycle::{EventHandlers, FetchOutcome, WorkerScope};
use crate::policy::{decode_path, is_markup, InterceptPolicy};
use crate::protocol::{Message, Reply};
use crate::response;
use crate::source::AssetSource;
use crate::state::{EngineState, KeyState, MemoryKeyState};

/// A request as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    url: Url,
}

impl ContentRequest {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Url::parse(url).map(Self::new)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

pub struct Engine<S, K = MemoryKeyState> {
    origin: Url,
    policy: InterceptPolicy,
    enc_root: String,
    bootstrap_script: String,
    entry_location: HeaderValue,
    cache_control: HeaderValue,
    source: S,
    keys: K,
}

impl<S: AssetSource> Engine<S, MemoryKeyState> {
    /// Engine with an in-memory key holder, starting in `NoKey`.
    pub fn new(config: &SiteConfig, source: S) -> EncsiteResult<Self> {
        Self::with_key_state(config, source, MemoryKeyState::new())
    }
}

impl<S: AssetSource, K: KeyState> Engine<S, K> {
    pub fn with_key_state(config: &SiteConfig, source: S, keys: K) -> EncsiteResult<Self> {
        let origin = Url::parse(&config.site.origin)
            .map_err(|e| EncsiteError::Config(format!("site.origin: {e}")))?;
        let entry = origin
            .join(&config.site.entry_path)
            .map_err(|e| EncsiteError::Config(format!("site.entry_path: {e}")))?;
        let entry_location = HeaderValue::from_str(entry.as_str())
            .map_err(|e| EncsiteError::Config(format!("site.entry_path: {e}")))?;
        let cache_control =
            HeaderValue::from_str(&format!("public, max-age={}", config.engine.cache_max_age_secs))
                .map_err(|e| EncsiteError::Config(format!("engine.cache_max_age_secs: {e}")))?;

        Ok(Self {
            origin,
            policy: InterceptPolicy::new(&config.site, &config.engine),
            enc_root: config.site.enc_root.clone(),
            bootstrap_script: config.site.bootstrap_script.clone(),
            entry_location,
            cache_control,
            source,
            keys,
        })
    }

    pub fn state(&self) -> EngineState {
        match self.keys.get() {
            Some(_) => EngineState::KeyPresent,
            None => EngineState::NoKey,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Decide and, when intercepting, produce the response for one request.
    pub async fn handle_fetch(&self, request: &ContentRequest) -> FetchOutcome {
        let url = request.url();
        if url.origin() != self.origin.origin() {
            return FetchOutcome::PassThrough;
        }

        let raw = url.path();
        let decoded = decode_path(raw);
        let path = decoded.as_deref().unwrap_or(raw);
        if self.policy.is_plain(path) {
            debug!(path, "pass through: plain path");
            return FetchOutcome::PassThrough;
        }

        // no key: never look up the ciphertext counterpart
        let Some(key) = self.keys.get() else {
            return FetchOutcome::PassThrough;
        };

        if !self.policy.is_content(path) {
            debug!(path, "pass through: not a content path");
            return FetchOutcome::PassThrough;
        }

        let Some(path) = decoded.as_deref() else {
            warn!(path = raw, "undecodable or escaping path refused");
            return FetchOutcome::Respond(response::not_found(raw));
        };
        debug!(path, "intercepting");
        FetchOutcome::Respond(self.serve_decrypted(path, &key).await)
    }

    async fn serve_decrypted(&self, path: &str, key: &SecretString) -> Response<Bytes> {
        let asset_path = encrypted_path_for(&self.enc_root, path);

        let asset = match self.source.fetch(&asset_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path, asset = %asset_path, "ciphertext fetch failed: {e}");
                return response::not_found(path);
            }
        };

        match decrypt(&asset, key.expose_secret()) {
            Ok(plaintext) if is_markup(path) => {
                let html = String::from_utf8_lossy(&plaintext);
                response::markup(
                    inject_bootstrap(&html, &self.bootstrap_script),
                    &self.cache_control,
                )
            }
            Ok(plaintext) => response::asset(plaintext, mime_type_of(path), &self.cache_control),
            Err(e) => {
                self.keys.set(None);
                warn!(path, "decode failed, key cleared: {e}");
                if is_markup(path) {
                    response::redirect(&self.entry_location)
                } else {
                    response::forbidden(path)
                }
            }
        }
    }

    /// Apply one key transport message.
    pub fn handle_message(&self, message: Message) -> Option<Reply> {
        match message {
            Message::SetKey { key } => {
                if key.trim().is_empty() {
                    warn!("SET_KEY with blank key rejected");
                    return Some(Reply::KeySet { success: false });
                }
                self.keys.set(Some(SecretString::from(key)));
                info!("decryption key set");
                Some(Reply::KeySet { success: true })
            }
            Message::ClearKey => {
                self.keys.set(None);
                info!("decryption key cleared");
                None
            }
            Message::Ping => Some(Reply::Pong {
                key_available: self.keys.get().is_some(),
            }),
        }
    }
}

impl<S: AssetSource, K: KeyState> EventHandlers for Engine<S, K> {
    fn on_install(&self, scope: &dyn WorkerScope) {
        info!("engine installed");
        scope.skip_waiting();
    }

    fn on_activate(&self, scope: &dyn WorkerScope) {
        info!("engine activated");
        scope.claim_clients();
    }

    async fn on_fetch(&self, request: ContentRequest) -> FetchOutcome {
        self.handle_fetch(&request).await
    }

    fn on_message(&self, message: Message) -> Option<Reply> {
        self.handle_message(message)
    }
}

impl<S, K: KeyState> std::fmt::Debug for Engine<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("origin", &self.origin.as_str())
            .field("enc_root", &self.enc_root)
            .field("key_present", &self.keys.get().is_some())
            .finish_non_exhaustive()
    }
}

//! Key acquisition
//!
//! Two sources: a key typed by the user ([`ManualKeySource`]) or an OAuth 2.0
//! authorization-code flow with PKCE ([`OAuthClient`]) that ends with a call
//! to the key API using the obtained access token.
//!
//! The HTTP side of the OAuth flow (discovery, token POST, key API GET) is
//! behind [`IdentityProvider`].

use std::future::Future;
use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use encsite_core::config::OAuthConfig;
use rand::Rng;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::credential::CredentialStore;
use crate::error::AuthFlowError;

/// RFC 3986 unreserved characters
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub trait ManualKeySource {
    fn acquire_key_manually(&self) -> Result<String, AuthFlowError>;
}

/// A key supplied up front (command-line flag, environment)
pub struct FixedKeySource(pub Option<String>);

impl ManualKeySource for FixedKeySource {
    fn acquire_key_manually(&self) -> Result<String, AuthFlowError> {
        match self.0.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(AuthFlowError::Cancelled),
        }
    }
}

/// PKCE and CSRF material kept between redirect and callback
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthState {
    pub code_verifier: String,
    pub state: String,
    pub nonce: String,
    #[serde(rename = "preAuthPath")]
    pub pre_auth_path: String,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("state", &self.state)
            .field("pre_auth_path", &self.pre_auth_path)
            .finish_non_exhaustive()
    }
}

pub trait AuthStateStore: Send + Sync {
    fn put(&self, state: AuthState);
    /// Remove and return the stored state; a second call returns `None`.
    fn take(&self) -> Option<AuthState>;
}

#[derive(Default)]
pub struct MemoryAuthStateStore {
    slot: Mutex<Option<AuthState>>,
}

impl AuthStateStore for MemoryAuthStateStore {
    fn put(&self, state: AuthState) {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(state);
    }

    fn take(&self) -> Option<AuthState> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// OpenID provider metadata (the fields the flow uses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    #[serde(default)]
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationKey {
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Key API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfo {
    pub has_key: bool,
    #[serde(default)]
    pub application_key: Option<ApplicationKey>,
}

pub trait IdentityProvider: Send + Sync {
    /// GET the provider metadata document at `discovery_url`.
    fn discover(
        &self,
        discovery_url: &str,
    ) -> impl Future<Output = Result<OidcConfig, AuthFlowError>> + Send;

    /// POST the form-encoded token request to `token_endpoint`.
    fn exchange_code(
        &self,
        token_endpoint: &str,
        form: Vec<(&'static str, String)>,
    ) -> impl Future<Output = Result<TokenResponse, AuthFlowError>> + Send;

    /// GET `key_api_url` with `Authorization: Bearer <access_token>`.
    fn key_info(
        &self,
        key_api_url: &str,
        access_token: &str,
    ) -> impl Future<Output = Result<KeyInfo, AuthFlowError>> + Send;
}

/// Where to send the browser to log in
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

pub struct OAuthClient<I, A> {
    provider: I,
    states: A,
    origin: Url,
    discovery_url: String,
    key_api_url: String,
    client_id: String,
    redirect_uri: String,
    scope: String,
    verifier_len: usize,
    state_len: usize,
    nonce_len: usize,
}

impl<I: IdentityProvider, A: AuthStateStore> OAuthClient<I, A> {
    /// Endpoints in `config` may be absolute or relative to `origin`.
    pub fn new(
        config: &OAuthConfig,
        origin: &str,
        provider: I,
        states: A,
    ) -> Result<Self, AuthFlowError> {
        let base = Url::parse(origin).map_err(|e| AuthFlowError::Config(format!("origin: {e}")))?;
        let resolve = |field: &str, value: &str| {
            base.join(value)
                .map(String::from)
                .map_err(|e| AuthFlowError::Config(format!("{field}: {e}")))
        };
        let discovery_url = resolve("discovery_url", &config.discovery_url)?;
        let key_api_url = resolve("key_api_url", &config.key_api_url)?;
        let redirect_uri = config.redirect_uri.clone().unwrap_or_else(|| {
            format!("{}/oauth/callback.html", origin.trim_end_matches('/'))
        });
        Ok(Self {
            provider,
            states,
            origin: base,
            discovery_url,
            key_api_url,
            client_id: config.client_id.clone(),
            redirect_uri,
            scope: config.scope.clone(),
            verifier_len: config.code_verifier_length,
            state_len: config.state_length,
            nonce_len: config.nonce_length,
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Generate PKCE material, persist it, and build the authorization URL.
    pub async fn start_authorization(
        &self,
        pre_auth_path: &str,
    ) -> Result<AuthorizationRequest, AuthFlowError> {
        let provider = self.provider.discover(&self.discovery_url).await?;
        let mut url = Url::parse(&provider.authorization_endpoint)
            .map_err(|e| AuthFlowError::Discovery(format!("authorization_endpoint: {e}")))?;

        let auth = AuthState {
            code_verifier: random_string(self.verifier_len),
            state: random_string(self.state_len),
            nonce: random_string(self.nonce_len),
            pre_auth_path: pre_auth_path.to_string(),
        };

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", &auth.state)
            .append_pair("nonce", &auth.nonce)
            .append_pair("code_challenge", &code_challenge(&auth.code_verifier))
            .append_pair("code_challenge_method", "S256");

        let state = auth.state.clone();
        self.states.put(auth);
        debug!(endpoint = %provider.authorization_endpoint, "authorization started");
        Ok(AuthorizationRequest { url, state })
    }

    /// Redeem the authorization code. The stored state is consumed either way.
    pub async fn exchange_code_for_token(
        &self,
        code: &str,
        state: &str,
    ) -> Result<TokenResponse, AuthFlowError> {
        self.exchange(code, state).await.map(|(token, _)| token)
    }

    pub async fn fetch_application_key(
        &self,
        access_token: &str,
    ) -> Result<SecretString, AuthFlowError> {
        let info = self.provider.key_info(&self.key_api_url, access_token).await?;
        match info.application_key {
            Some(app_key) if info.has_key && !app_key.key.trim().is_empty() => {
                Ok(SecretString::from(app_key.key))
            }
            _ => Err(AuthFlowError::NoKeyForUser),
        }
    }

    /// Callback page logic: exchange, fetch the key, persist it, and return
    /// the path to send the browser back to (carrying the redirect marker).
    pub async fn complete_callback<C: CredentialStore>(
        &self,
        code: &str,
        state: &str,
        credentials: &C,
        redirect_marker: &str,
    ) -> Result<String, AuthFlowError> {
        let (token, auth) = self.exchange(code, state).await?;
        let key = self.fetch_application_key(&token.access_token).await?;
        credentials
            .store(&key)
            .map_err(|e| AuthFlowError::Storage(e.to_string()))?;
        info!(path = %auth.pre_auth_path, "key acquired via OAuth");
        self.return_path(&auth.pre_auth_path, redirect_marker)
    }

    /// Same-origin path and query for `pre_auth_path` with the marker appended.
    fn return_path(
        &self,
        pre_auth_path: &str,
        redirect_marker: &str,
    ) -> Result<String, AuthFlowError> {
        let mut url = self
            .origin
            .join(pre_auth_path)
            .map_err(|e| AuthFlowError::Config(format!("pre-auth path: {e}")))?;
        url.query_pairs_mut().append_pair(redirect_marker, "1");

        let mut back = url.path().to_string();
        if let Some(query) = url.query() {
            back.push('?');
            back.push_str(query);
        }
        if let Some(fragment) = url.fragment() {
            back.push('#');
            back.push_str(fragment);
        }
        Ok(back)
    }

    async fn exchange(
        &self,
        code: &str,
        state: &str,
    ) -> Result<(TokenResponse, AuthState), AuthFlowError> {
        let auth = self.states.take().ok_or(AuthFlowError::MissingState)?;
        if auth.state != state {
            return Err(AuthFlowError::StateMismatch);
        }

        let provider = self.provider.discover(&self.discovery_url).await?;
        let form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("client_id", self.client_id.clone()),
            ("code_verifier", auth.code_verifier.clone()),
        ];
        let token = self
            .provider
            .exchange_code(&provider.token_endpoint, form)
            .await?;
        Ok((token, auth))
    }
}

/// `len` characters drawn uniformly from the unreserved set.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| UNRESERVED[rng.gen_range(0..UNRESERVED.len())] as char)
        .collect()
}

/// S256 challenge: base64url(SHA-256(verifier)) without padding.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

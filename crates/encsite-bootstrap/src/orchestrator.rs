//! Effect interpreter for the bootstrap machine
//!
//! [`Bootstrap`] owns a [`Machine`] and the candidate key, and performs each
//! effect against the host seams: [`PageHost`] for the page itself,
//! [`CredentialStore`] for the persisted key, [`EngineRegistry`] for the
//! engine, and a [`KeyProbe`] for verification. Every engine call is bounded
//! by a timeout; none of them is retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use encsite_core::SiteConfig;
use encsite_engine::registry::LocalRegistry;
use encsite_engine::{AssetSource, EngineHandle, EventHandlers, RegistryError};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use url::Url;

use crate::credential::CredentialStore;
use crate::machine::{BootState, Effect, Event, Machine, Snapshot, Step};
use crate::session::SessionFlag;
use crate::verify::KeyProbe;

/// The page the bootstrap runs in
pub trait PageHost: Send + Sync {
    fn current_url(&self) -> Url;
    /// Rewrite the address bar without navigating.
    fn replace_url(&self, url: &Url);

    fn session_flag(&self, flag: SessionFlag) -> bool;
    fn set_session_flag(&self, flag: SessionFlag, on: bool);

    fn show_key_entry(&self);
    fn show_error(&self, message: &str);
    fn show_logout_control(&self);

    /// Fetch a same-origin document; routed through the engine when it controls the page.
    fn fetch_document(&self, path: &str) -> impl Future<Output = anyhow::Result<String>> + Send;
    fn render_document(&self, html: &str);

    /// Navigate to `url`, replacing the current history entry.
    fn navigate_replace(&self, url: &Url);
    fn reload(&self);
}

impl<P: PageHost> PageHost for Arc<P> {
    fn current_url(&self) -> Url {
        self.as_ref().current_url()
    }

    fn replace_url(&self, url: &Url) {
        self.as_ref().replace_url(url)
    }

    fn session_flag(&self, flag: SessionFlag) -> bool {
        self.as_ref().session_flag(flag)
    }

    fn set_session_flag(&self, flag: SessionFlag, on: bool) {
        self.as_ref().set_session_flag(flag, on)
    }

    fn show_key_entry(&self) {
        self.as_ref().show_key_entry()
    }

    fn show_error(&self, message: &str) {
        self.as_ref().show_error(message)
    }

    fn show_logout_control(&self) {
        self.as_ref().show_logout_control()
    }

    async fn fetch_document(&self, path: &str) -> anyhow::Result<String> {
        self.as_ref().fetch_document(path).await
    }

    fn render_document(&self, html: &str) {
        self.as_ref().render_document(html)
    }

    fn navigate_replace(&self, url: &Url) {
        self.as_ref().navigate_replace(url)
    }

    fn reload(&self) {
        self.as_ref().reload()
    }
}

/// Where the page finds and registers its engine
pub trait EngineRegistry: Send + Sync {
    /// The engine controlling this page, if any.
    fn controller(&self) -> Option<EngineHandle>;
    fn register(&self) -> impl Future<Output = Result<EngineHandle, RegistryError>> + Send;
    fn unregister(&self) -> impl Future<Output = ()> + Send;
}

impl<H: EventHandlers + 'static> EngineRegistry for LocalRegistry<H> {
    fn controller(&self) -> Option<EngineHandle> {
        LocalRegistry::controller(self)
    }

    async fn register(&self) -> Result<EngineHandle, RegistryError> {
        LocalRegistry::register(self).await
    }

    async fn unregister(&self) {
        LocalRegistry::unregister(self)
    }
}

impl<R: EngineRegistry> EngineRegistry for Arc<R> {
    fn controller(&self) -> Option<EngineHandle> {
        self.as_ref().controller()
    }

    async fn register(&self) -> Result<EngineHandle, RegistryError> {
        self.as_ref().register().await
    }

    async fn unregister(&self) {
        self.as_ref().unregister().await
    }
}

pub struct Bootstrap<P, C, R, S> {
    host: P,
    credentials: C,
    registry: R,
    probe: KeyProbe<S>,
    machine: Machine,
    candidate: Option<SecretString>,
    engine: Option<EngineHandle>,
    redirect_marker: String,
    entry_path: String,
    registration_timeout: Duration,
}

impl<P, C, R, S> Bootstrap<P, C, R, S>
where
    P: PageHost,
    C: CredentialStore,
    R: EngineRegistry,
    S: AssetSource,
{
    pub fn new(config: &SiteConfig, host: P, credentials: C, registry: R, probe: KeyProbe<S>) -> Self {
        Self {
            host,
            credentials,
            registry,
            probe,
            machine: Machine::new(&config.bootstrap),
            candidate: None,
            engine: None,
            redirect_marker: config.bootstrap.redirect_marker.clone(),
            entry_path: config.site.entry_path.clone(),
            registration_timeout: config.transport.registration_timeout(),
        }
    }

    pub fn state(&self) -> BootState {
        self.machine.state()
    }

    pub fn host(&self) -> &P {
        &self.host
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Run the page-load decision sequence to completion.
    pub async fn start(&mut self) -> BootState {
        let credential_error = match self.credentials.load() {
            Ok(candidate) => {
                self.candidate = candidate;
                None
            }
            Err(e) => {
                warn!("credential load failed: {e:#}");
                self.candidate = None;
                Some(e.to_string())
            }
        };
        let page = self.snapshot(credential_error);
        debug!(?page, "bootstrap start");
        let step = self.machine.start(&page);
        self.drive(step).await
    }

    /// Make sure the engine holds the persisted key, then reload.
    pub async fn force_content_load(&mut self) -> BootState {
        if self.candidate.is_none() {
            self.candidate = self.credentials.load().unwrap_or_else(|e| {
                warn!("credential load failed: {e:#}");
                None
            });
        }
        let step = self.machine.force_content_load(
            self.candidate.is_some(),
            self.registry.controller().is_some(),
        );
        self.drive(step).await
    }

    /// Accept a manually entered key.
    pub async fn submit_key(&mut self, key: &str) -> BootState {
        let key = key.trim();
        if !key.is_empty() {
            self.candidate = Some(SecretString::from(key));
        }
        let step = self.machine.submit_key(key.is_empty());
        self.drive(step).await
    }

    pub async fn logout(&mut self) -> BootState {
        info!("logging out");
        let step = self.machine.logout();
        self.drive(step).await
    }

    fn snapshot(&self, credential_error: Option<String>) -> Snapshot {
        Snapshot {
            reload_in_progress: self.host.session_flag(SessionFlag::ReloadInProgress),
            content_loaded: self.host.session_flag(SessionFlag::ContentLoaded),
            has_key: self.candidate.is_some(),
            redirect_marker: self
                .host
                .current_url()
                .query_pairs()
                .any(|(name, _)| name == self.redirect_marker.as_str()),
            engine_controls: self.registry.controller().is_some(),
            credential_error,
        }
    }

    async fn drive(&mut self, mut step: Step) -> BootState {
        loop {
            let mut outcome = None;
            for effect in step.effects {
                // an outcome ends the step; the rest belongs to the old plan
                if let Some(event) = self.apply(effect).await {
                    outcome = Some(event);
                    break;
                }
            }
            match outcome {
                Some(event) => {
                    debug!(?event, "bootstrap event");
                    step = self.machine.handle(event);
                }
                None => return step.state,
            }
        }
    }

    async fn apply(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::ClearReloadFlag => {
                self.host
                    .set_session_flag(SessionFlag::ReloadInProgress, false);
            }
            Effect::SetReloadFlag => {
                self.host
                    .set_session_flag(SessionFlag::ReloadInProgress, true);
            }
            Effect::SetContentLoaded => {
                self.host.set_session_flag(SessionFlag::ContentLoaded, true);
            }
            Effect::ClearSessionFlags => {
                self.host
                    .set_session_flag(SessionFlag::ReloadInProgress, false);
                self.host.set_session_flag(SessionFlag::ContentLoaded, false);
            }
            Effect::RenderEntryDocument => match self.host.fetch_document(&self.entry_path).await {
                Ok(html) => self.host.render_document(&html),
                Err(e) => {
                    warn!(path = %self.entry_path, "entry document load failed: {e:#}");
                    self.host
                        .show_error(&format!("Failed to load decrypted content: {e}"));
                }
            },
            Effect::StripRedirectMarker => {
                let url = self.host.current_url();
                self.host.replace_url(&strip_query_param(&url, &self.redirect_marker));
            }
            Effect::PersistCredential => {
                if let Some(key) = &self.candidate {
                    if let Err(e) = self.credentials.store(key) {
                        warn!("credential store failed: {e:#}");
                        self.candidate = None;
                        return Some(Event::Unexpected(format!("Could not save the key: {e}")));
                    }
                }
            }
            Effect::ClearCredential => {
                self.candidate = None;
                if let Err(e) = self.credentials.clear() {
                    warn!("credential clear failed: {e:#}");
                    return Some(Event::Unexpected(format!(
                        "Could not remove the stored key: {e}"
                    )));
                }
            }
            Effect::ShowKeyEntry => self.host.show_key_entry(),
            Effect::ShowError(message) => self.host.show_error(&message),
            Effect::ShowLogoutControl => self.host.show_logout_control(),
            Effect::ClearEngineKey => {
                if let Some(engine) = self.registry.controller().or_else(|| self.engine.clone()) {
                    if let Err(e) = engine.clear_key().await {
                        debug!("CLEAR_KEY not delivered: {e}");
                    } else {
                        // PING queues behind CLEAR_KEY; its reply means the clear was applied
                        match engine.ping().await {
                            Ok(false) => debug!("engine key cleared"),
                            Ok(true) => warn!("engine still reports a key after CLEAR_KEY"),
                            Err(e) => debug!("CLEAR_KEY not confirmed: {e}"),
                        }
                    }
                }
            }
            Effect::UnregisterEngine => {
                self.registry.unregister().await;
                self.engine = None;
            }
            Effect::Navigate(delay) => {
                tokio::time::sleep(delay).await;
                let url = self.host.current_url();
                self.host.navigate_replace(&url);
            }
            Effect::Reload(delay) => {
                tokio::time::sleep(delay).await;
                self.host.reload();
            }
            Effect::Wait(delay) => {
                tokio::time::sleep(delay).await;
                return Some(Event::WaitElapsed {
                    engine_controls: self.registry.controller().is_some(),
                });
            }
            Effect::Ping => return Some(self.ping().await),
            Effect::SendKey => return Some(self.send_key().await),
            Effect::RegisterEngine => return Some(self.register().await),
            Effect::VerifyKey => return Some(self.verify().await),
        }
        None
    }

    async fn ping(&mut self) -> Event {
        let Some(engine) = self.registry.controller() else {
            debug!("no controlling engine");
            return Event::PingFailed;
        };
        let reply = engine.ping().await;
        self.engine = Some(engine);
        match reply {
            Ok(key_available) => Event::PingReplied { key_available },
            Err(e) => {
                warn!("PING failed: {e}");
                Event::PingFailed
            }
        }
    }

    async fn send_key(&mut self) -> Event {
        let (Some(engine), Some(key)) = (
            self.engine.clone().or_else(|| self.registry.controller()),
            self.candidate.as_ref(),
        ) else {
            return Event::KeySetFailed;
        };
        match engine.set_key(key.expose_secret()).await {
            Ok(()) => {
                info!(key_len = key.expose_secret().len(), "key delivered to engine");
                Event::KeySetConfirmed
            }
            Err(e) => {
                warn!("SET_KEY failed: {e}");
                Event::KeySetFailed
            }
        }
    }

    async fn register(&mut self) -> Event {
        match tokio::time::timeout(self.registration_timeout, self.registry.register()).await {
            Ok(Ok(engine)) => {
                self.engine = Some(engine);
                Event::Registered
            }
            Ok(Err(e)) => Event::RegistrationFailed(e.to_string()),
            Err(_) => Event::RegistrationFailed(
                RegistryError::Timeout(self.registration_timeout).to_string(),
            ),
        }
    }

    async fn verify(&self) -> Event {
        let Some(key) = &self.candidate else {
            return Event::KeyInvalid;
        };
        match self.probe.verify(key.expose_secret()).await {
            Ok(()) => Event::KeyVerified,
            Err(e) => {
                warn!("key verification failed: {e}");
                Event::KeyInvalid
            }
        }
    }
}

/// `url` without any occurrence of query parameter `name`.
fn strip_query_param(url: &Url, name: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut out = url.clone();
    if kept.is_empty() {
        out.set_query(None);
    } else {
        out.query_pairs_mut().clear().extend_pairs(kept);
    }
    out
}

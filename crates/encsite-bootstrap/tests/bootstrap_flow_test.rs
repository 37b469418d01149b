//! Bootstrap flows against a real engine hosted in-process.

use std::sync::{Arc, Mutex};

use encsite_bootstrap::{
    BootState, Bootstrap, CredentialStore, EngineRegistry, KeyProbe, MemoryCredentialStore,
    MemorySession, PageHost, SessionFlag,
};
use encsite_core::SiteConfig;
use encsite_engine::registry::LocalRegistry;
use encsite_engine::transport;
use encsite_engine::{
    ContentRequest, Engine, EngineHandle, EngineState, FetchOutcome, OperatorSource,
    RegistryError,
};
use secrecy::ExposeSecret;
use url::Url;

type SiteEngine = Engine<OperatorSource>;
type SiteRegistry = Arc<LocalRegistry<SiteEngine>>;

const LOCKED_PAGE: &str = "<html><head></head><body>locked</body></html>";

fn config() -> SiteConfig {
    let mut config = SiteConfig::default();
    config.bootstrap.reload_delay_ms = 1;
    config.bootstrap.oauth_reload_delay_ms = 1;
    config.transport.ping_timeout_ms = 50;
    config.transport.key_confirm_timeout_ms = 50;
    config
}

/// Page double: records what the bootstrap did to it
struct TestPage {
    url: Mutex<Url>,
    session: MemorySession,
    registry: SiteRegistry,
    log: Mutex<Vec<String>>,
}

impl TestPage {
    fn new(url: &str, registry: SiteRegistry) -> Arc<Self> {
        Arc::new(Self {
            url: Mutex::new(Url::parse(url).unwrap()),
            session: MemorySession::default(),
            registry,
            log: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn did(&self, prefix: &str) -> bool {
        self.log().iter().any(|e| e.starts_with(prefix))
    }
}

impl PageHost for TestPage {
    fn current_url(&self) -> Url {
        self.url.lock().unwrap().clone()
    }

    fn replace_url(&self, url: &Url) {
        self.record(format!("replace_url {url}"));
        *self.url.lock().unwrap() = url.clone();
    }

    fn session_flag(&self, flag: SessionFlag) -> bool {
        self.session.get(flag)
    }

    fn set_session_flag(&self, flag: SessionFlag, on: bool) {
        self.session.set(flag, on);
    }

    fn show_key_entry(&self) {
        self.record("key_entry");
    }

    fn show_error(&self, message: &str) {
        self.record(format!("error {message}"));
    }

    fn show_logout_control(&self) {
        self.record("logout_control");
    }

    async fn fetch_document(&self, path: &str) -> anyhow::Result<String> {
        let url = self.current_url().join(path)?;
        match self.registry.fetch(ContentRequest::new(url)).await {
            FetchOutcome::Respond(resp) => Ok(String::from_utf8(resp.body().to_vec())?),
            FetchOutcome::PassThrough => Ok(LOCKED_PAGE.to_string()),
        }
    }

    fn render_document(&self, html: &str) {
        self.record(format!("render {html}"));
    }

    fn navigate_replace(&self, url: &Url) {
        self.record(format!("navigate {url}"));
        self.registry.reload_page();
    }

    fn reload(&self) {
        self.record("reload");
        self.registry.reload_page();
    }
}

struct Site {
    engine: Arc<SiteEngine>,
    registry: SiteRegistry,
    source: OperatorSource,
    credentials: Arc<MemoryCredentialStore>,
}

async fn site(sealed_with: &str, stored_key: Option<&str>) -> Site {
    let source = OperatorSource::memory().unwrap();
    let page = encsite_crypto::encrypt(
        b"<html><head><title>t</title></head><body>decrypted</body></html>",
        sealed_with,
    )
    .unwrap();
    source
        .operator()
        .write("enc/index.html.enc", page)
        .await
        .unwrap();

    let cfg = config();
    let engine = Arc::new(Engine::new(&cfg, source.clone()).unwrap());
    let registry = Arc::new(LocalRegistry::new(Arc::clone(&engine), cfg.transport.clone()));
    let credentials = Arc::new(match stored_key {
        Some(key) => MemoryCredentialStore::with_key(key),
        None => MemoryCredentialStore::default(),
    });
    Site {
        engine,
        registry,
        source,
        credentials,
    }
}

fn bootstrap(
    site: &Site,
    page: &Arc<TestPage>,
) -> Bootstrap<Arc<TestPage>, Arc<MemoryCredentialStore>, SiteRegistry, OperatorSource> {
    let cfg = config();
    Bootstrap::new(
        &cfg,
        Arc::clone(page),
        Arc::clone(&site.credentials),
        Arc::clone(&site.registry),
        KeyProbe::new(site.source.clone(), &cfg.site.enc_root, &cfg.bootstrap.probe_path),
    )
}

#[tokio::test]
async fn first_visit_registers_verifies_and_hands_over_key() {
    let site = site("k1", Some("k1")).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));

    let state = bootstrap(&site, &page).start().await;

    assert_eq!(state, BootState::Settled);
    assert_eq!(site.engine.state(), EngineState::KeyPresent);
    assert!(site.registry.controller().is_some());
    assert!(page.did("logout_control"));
    assert!(!page.did("reload"));
}

#[tokio::test]
async fn second_load_reloads_once_then_renders_decrypted_entry() {
    let site = site("k1", Some("k1")).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));
    bootstrap(&site, &page).start().await;

    // page load with the engine in control and holding the key
    let state = bootstrap(&site, &page).start().await;
    assert_eq!(state, BootState::ReloadPending);
    assert!(page.session.get(SessionFlag::ReloadInProgress));
    assert!(page.did("navigate http://localhost:8080/index.html"));

    // the reloaded page converts the flag and renders through the engine
    let state = bootstrap(&site, &page).start().await;
    assert_eq!(state, BootState::Settled);
    assert!(!page.session.get(SessionFlag::ReloadInProgress));
    assert!(page.session.get(SessionFlag::ContentLoaded));

    let rendered = page
        .log()
        .into_iter()
        .find(|e| e.starts_with("render "))
        .expect("entry document rendered");
    assert!(rendered.contains("decrypted"));
    assert_eq!(rendered.matches("bootstrap.js").count(), 1);

    // and any further load in the session is a no-op
    let before = page.log().len();
    assert_eq!(bootstrap(&site, &page).start().await, BootState::Settled);
    assert_eq!(page.log().len(), before);
}

#[tokio::test]
async fn invalid_stored_key_is_cleared() {
    let site = site("right", Some("wrong")).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));

    let state = bootstrap(&site, &page).start().await;

    assert_eq!(state, BootState::KeyEntryRequired);
    assert!(site.credentials.load().unwrap().is_none());
    assert_eq!(site.engine.state(), EngineState::NoKey);
    assert!(page.did("error The provided decryption key is invalid"));
    assert!(page.did("key_entry"));
}

#[tokio::test]
async fn manual_entry_persists_and_reloads() {
    let site = site("k1", None).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));
    let mut boot = bootstrap(&site, &page);

    assert_eq!(boot.start().await, BootState::KeyEntryRequired);
    assert_eq!(boot.submit_key("   ").await, BootState::KeyEntryRequired);
    assert!(page.did("error Please enter a decryption key"));

    assert_eq!(boot.submit_key(" k1 ").await, BootState::ReloadPending);
    assert_eq!(
        site.credentials.load().unwrap().unwrap().expose_secret(),
        "k1"
    );
    assert_eq!(site.engine.state(), EngineState::KeyPresent);
    assert!(page.did("reload"));
}

#[tokio::test]
async fn oauth_return_strips_marker_and_forces_reload() {
    let site = site("k1", Some("k1")).await;
    let page = TestPage::new(
        "http://localhost:8080/docs.html?oauth_success=1&tab=a",
        Arc::clone(&site.registry),
    );

    let state = bootstrap(&site, &page).start().await;

    assert_eq!(state, BootState::ReloadPending);
    assert!(page.did("replace_url http://localhost:8080/docs.html?tab=a"));
    assert_eq!(site.engine.state(), EngineState::KeyPresent);
    assert_eq!(page.log().last().map(String::as_str), Some("reload"));
}

#[tokio::test]
async fn logout_tears_everything_down() {
    let site = site("k1", Some("k1")).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));
    let mut boot = bootstrap(&site, &page);
    boot.start().await;
    page.session.set(SessionFlag::ContentLoaded, true);

    assert_eq!(boot.logout().await, BootState::Idle);

    assert!(site.credentials.load().unwrap().is_none());
    assert!(!page.session.get(SessionFlag::ContentLoaded));
    assert_eq!(site.engine.state(), EngineState::NoKey);
    assert!(site.registry.controller().is_none());
    assert!(page.did("reload"));
}

/// A controller that never answers, in front of a working registry
struct Unresponsive {
    stuck: EngineHandle,
    _inbox: tokio::sync::mpsc::Receiver<transport::Envelope>,
    inner: SiteRegistry,
}

impl EngineRegistry for Unresponsive {
    fn controller(&self) -> Option<EngineHandle> {
        Some(self.stuck.clone())
    }

    async fn register(&self) -> Result<EngineHandle, RegistryError> {
        LocalRegistry::register(&self.inner).await
    }

    async fn unregister(&self) {
        LocalRegistry::unregister(&self.inner)
    }
}

#[tokio::test]
async fn ping_timeout_falls_back_to_registration() {
    let site = site("k1", Some("k1")).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));
    let cfg = config();
    let (stuck, inbox) = transport::channel(&cfg.transport);
    let registry = Unresponsive {
        stuck,
        _inbox: inbox,
        inner: Arc::clone(&site.registry),
    };

    let mut boot = Bootstrap::new(
        &cfg,
        Arc::clone(&page),
        Arc::clone(&site.credentials),
        registry,
        KeyProbe::new(site.source.clone(), "enc", "/index.html"),
    );

    assert_eq!(boot.start().await, BootState::Settled);
    assert_eq!(site.engine.state(), EngineState::KeyPresent);
    assert!(!page.did("key_entry"));
}

/// Credential store whose operations can be made to fail
#[derive(Default)]
struct BrokenStore {
    inner: MemoryCredentialStore,
    load_fails: bool,
    store_fails: bool,
    clear_fails: bool,
}

impl CredentialStore for BrokenStore {
    fn load(&self) -> anyhow::Result<Option<secrecy::SecretString>> {
        if self.load_fails {
            anyhow::bail!("corrupt credential");
        }
        self.inner.load()
    }

    fn store(&self, key: &secrecy::SecretString) -> anyhow::Result<()> {
        if self.store_fails {
            anyhow::bail!("disk full");
        }
        self.inner.store(key)
    }

    fn clear(&self) -> anyhow::Result<()> {
        if self.clear_fails {
            anyhow::bail!("read-only");
        }
        self.inner.clear()
    }
}

fn bootstrap_with_store(
    site: &Site,
    page: &Arc<TestPage>,
    store: BrokenStore,
) -> Bootstrap<Arc<TestPage>, BrokenStore, SiteRegistry, OperatorSource> {
    let cfg = config();
    Bootstrap::new(
        &cfg,
        Arc::clone(page),
        store,
        Arc::clone(&site.registry),
        KeyProbe::new(site.source.clone(), &cfg.site.enc_root, &cfg.bootstrap.probe_path),
    )
}

#[tokio::test]
async fn unreadable_credential_still_finishes_pending_reload() {
    let site = site("k1", None).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));
    page.session.set(SessionFlag::ReloadInProgress, true);
    let store = BrokenStore {
        load_fails: true,
        ..BrokenStore::default()
    };

    let state = bootstrap_with_store(&site, &page, store).start().await;

    assert_eq!(state, BootState::Settled);
    assert!(!page.session.get(SessionFlag::ReloadInProgress));
    assert!(page.session.get(SessionFlag::ContentLoaded));
    assert!(page.did("render "));
    assert!(!page.did("error"));
}

#[tokio::test]
async fn unreadable_credential_without_flags_reports_and_asks_for_key() {
    let site = site("k1", None).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));
    let store = BrokenStore {
        load_fails: true,
        ..BrokenStore::default()
    };

    let state = bootstrap_with_store(&site, &page, store).start().await;

    assert_eq!(state, BootState::KeyEntryRequired);
    assert_eq!(
        page.log(),
        vec!["error Initialization failed: corrupt credential", "key_entry"]
    );
}

#[tokio::test]
async fn failed_key_save_is_reported_instead_of_reloading() {
    let site = site("k1", None).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));
    let store = BrokenStore {
        store_fails: true,
        ..BrokenStore::default()
    };
    let mut boot = bootstrap_with_store(&site, &page, store);

    assert_eq!(boot.submit_key("k1").await, BootState::KeyEntryRequired);

    assert!(page.did("error Could not save the key: disk full"));
    assert_eq!(page.log().last().map(String::as_str), Some("key_entry"));
    assert!(!page.did("reload"));
    assert_eq!(site.engine.state(), EngineState::NoKey);
}

#[tokio::test]
async fn failed_credential_clear_on_logout_is_reported() {
    let site = site("k1", None).await;
    let page = TestPage::new("http://localhost:8080/index.html", Arc::clone(&site.registry));
    let store = BrokenStore {
        inner: MemoryCredentialStore::with_key("k1"),
        clear_fails: true,
        ..BrokenStore::default()
    };
    let mut boot = bootstrap_with_store(&site, &page, store);
    assert_eq!(boot.start().await, BootState::Settled);

    assert_eq!(boot.logout().await, BootState::KeyEntryRequired);

    assert!(page.did("error Could not remove the stored key: read-only"));
    assert!(!page.did("reload"));
    // the engine side is still torn down
    assert_eq!(site.engine.state(), EngineState::NoKey);
    assert!(site.registry.controller().is_none());
}

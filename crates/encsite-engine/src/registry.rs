//! In-process engine host
//!
//! Plays the part a browser's worker registry plays for a page: install,
//! activate, a running message loop, and the notion of the engine
//! *controlling* the page. Only a controlled page has its fetches routed
//! through the engine, and only a controlled page gets a handle from
//! [`LocalRegistry::controller`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use encsite_core::config::TransportConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::ContentRequest;
use crate::error::RegistryError;
use crate::lifecycle::{EventHandlers, FetchOutcome, WorkerScope};
use crate::transport::{self, EngineHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Installed, waiting for pages of a previous worker to go away
    Waiting,
    Active,
}

#[derive(Default)]
struct ScopeFlags {
    skip_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl WorkerScope for ScopeFlags {
    fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    fn claim_clients(&self) {
        self.claimed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Registration {
    phase: Option<WorkerPhase>,
    controlling: bool,
    handle: Option<EngineHandle>,
    task: Option<JoinHandle<()>>,
}

pub struct LocalRegistry<H> {
    handlers: Arc<H>,
    transport: TransportConfig,
    inner: Mutex<Registration>,
}

impl<H: EventHandlers + 'static> LocalRegistry<H> {
    pub fn new(handlers: Arc<H>, transport: TransportConfig) -> Self {
        Self {
            handlers,
            transport,
            inner: Mutex::new(Registration::default()),
        }
    }

    pub fn handlers(&self) -> &Arc<H> {
        &self.handlers
    }

    pub fn phase(&self) -> Option<WorkerPhase> {
        self.lock().phase
    }

    /// Handle to the engine, only while it controls the page.
    pub fn controller(&self) -> Option<EngineHandle> {
        let reg = self.lock();
        if reg.controlling {
            reg.handle.clone()
        } else {
            None
        }
    }

    /// Install and activate the engine, start its message loop, and return
    /// a handle to it. Registering again while active returns the running
    /// engine's handle.
    pub async fn register(&self) -> Result<EngineHandle, RegistryError> {
        let mut reg = self.lock();
        if let (Some(WorkerPhase::Active), Some(handle)) = (reg.phase, &reg.handle) {
            debug!("engine already registered");
            return Ok(handle.clone());
        }

        let scope = ScopeFlags::default();
        self.handlers.on_install(&scope);
        if !scope.skip_waiting.load(Ordering::SeqCst) {
            reg.phase = Some(WorkerPhase::Waiting);
            return Err(RegistryError::NotActivated);
        }

        self.handlers.on_activate(&scope);
        let (handle, inbox) = transport::channel(&self.transport);
        reg.task = Some(tokio::spawn(transport::serve(
            Arc::clone(&self.handlers),
            inbox,
        )));
        reg.phase = Some(WorkerPhase::Active);
        reg.controlling = scope.claimed.load(Ordering::SeqCst);
        reg.handle = Some(handle.clone());

        info!(controlling = reg.controlling, "engine registered");
        Ok(handle)
    }

    /// Stop the engine; the page is no longer controlled.
    pub fn unregister(&self) {
        let mut reg = self.lock();
        if let Some(task) = reg.task.take() {
            task.abort();
        }
        *reg = Registration::default();
        info!("engine unregistered");
    }

    /// A fresh navigation: an active engine always controls the new page.
    pub fn reload_page(&self) {
        let mut reg = self.lock();
        reg.controlling = reg.phase == Some(WorkerPhase::Active);
    }

    /// Route a page fetch; uncontrolled pages go straight to the network.
    pub async fn fetch(&self, request: ContentRequest) -> FetchOutcome {
        if self.controller().is_none() {
            return FetchOutcome::PassThrough;
        }
        self.handlers.on_fetch(request).await
    }

    fn lock(&self) -> MutexGuard<'_, Registration> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<H> Drop for LocalRegistry<H> {
    fn drop(&mut self) {
        let reg = self
            .inner
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = reg.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Message, Reply};

    /// Handlers that can be told to skip one of the lifecycle calls
    struct Scripted {
        skip_waiting: bool,
        claim: bool,
    }

    impl EventHandlers for Scripted {
        fn on_install(&self, scope: &dyn WorkerScope) {
            if self.skip_waiting {
                scope.skip_waiting();
            }
        }

        fn on_activate(&self, scope: &dyn WorkerScope) {
            if self.claim {
                scope.claim_clients();
            }
        }

        async fn on_fetch(&self, _request: ContentRequest) -> FetchOutcome {
            FetchOutcome::PassThrough
        }

        fn on_message(&self, message: Message) -> Option<Reply> {
            match message {
                Message::Ping => Some(Reply::Pong {
                    key_available: false,
                }),
                _ => None,
            }
        }
    }

    fn registry(skip_waiting: bool, claim: bool) -> LocalRegistry<Scripted> {
        LocalRegistry::new(
            Arc::new(Scripted {
                skip_waiting,
                claim,
            }),
            TransportConfig::default(),
        )
    }

    #[tokio::test]
    async fn register_activates_and_claims() {
        let reg = registry(true, true);
        assert!(reg.controller().is_none());

        let handle = reg.register().await.unwrap();
        assert_eq!(reg.phase(), Some(WorkerPhase::Active));
        assert!(reg.controller().is_some());
        assert!(!handle.ping().await.unwrap());
    }

    #[tokio::test]
    async fn without_skip_waiting_stays_waiting() {
        let reg = registry(false, true);
        assert_eq!(reg.register().await.unwrap_err(), RegistryError::NotActivated);
        assert_eq!(reg.phase(), Some(WorkerPhase::Waiting));
        assert!(reg.controller().is_none());
    }

    #[tokio::test]
    async fn without_claim_page_is_uncontrolled_until_reload() {
        let reg = registry(true, false);
        let handle = reg.register().await.unwrap();
        assert!(reg.controller().is_none());
        // the handle itself still reaches the engine
        assert!(handle.ping().await.is_ok());

        reg.reload_page();
        assert!(reg.controller().is_some());
    }

    #[tokio::test]
    async fn unregister_stops_loop() {
        let reg = registry(true, true);
        let handle = reg.register().await.unwrap();
        reg.unregister();

        assert!(reg.controller().is_none());
        assert_eq!(reg.phase(), None);
        assert!(handle.ping().await.is_err());
    }

    #[tokio::test]
    async fn register_twice_reuses_engine() {
        let reg = registry(true, true);
        reg.register().await.unwrap();
        let second = reg.register().await.unwrap();
        assert!(second.ping().await.is_ok());
    }
}

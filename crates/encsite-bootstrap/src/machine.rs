//! Bootstrap decision machine
//!
//! Pure: no I/O, no clocks. Every transition returns a [`Step`], the new
//! state plus the effects the orchestrator must perform in order. Effects
//! that produce an outcome (`Ping`, `SendKey`, `RegisterEngine`,
//! `VerifyKey`, `Wait`) always come last, and the outcome is fed back in as
//! an [`Event`]. A failed credential write or clear cuts its step short with
//! [`Event::Unexpected`].
//!
//! Three flows share the states:
//!
//! * **start**: the page-load decision sequence
//! * **forced load**: after an OAuth round trip; every path ends in a reload
//! * **submit**: a manually entered key; success ends in a reload

use std::time::Duration;

use encsite_core::config::BootstrapConfig;
use tracing::warn;

pub const INVALID_KEY_MESSAGE: &str = "The provided decryption key is invalid";
pub const BLANK_KEY_MESSAGE: &str = "Please enter a decryption key";
pub const KEY_DELIVERY_MESSAGE: &str =
    "Could not deliver the key to the engine, reload the page and try again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Idle,
    AwaitingEngineReply,
    ReloadPending,
    KeyEntryRequired,
    Registering,
    ContentReloadScheduled,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Start,
    ForcedLoad,
    Submit,
}

/// What the page knows at load time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub reload_in_progress: bool,
    pub content_loaded: bool,
    /// A persisted, non-blank candidate key exists
    pub has_key: bool,
    /// The OAuth redirect marker is in the URL
    pub redirect_marker: bool,
    /// The engine currently controls the page
    pub engine_controls: bool,
    /// Reading the persisted key failed; reported only once the session
    /// flags have been consulted
    pub credential_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ClearReloadFlag,
    SetReloadFlag,
    SetContentLoaded,
    ClearSessionFlags,
    /// Fetch the entry document (through the engine) and render it
    RenderEntryDocument,
    StripRedirectMarker,
    PersistCredential,
    ClearCredential,
    ShowKeyEntry,
    ShowError(String),
    ShowLogoutControl,
    ClearEngineKey,
    UnregisterEngine,
    /// Replace the current location with itself after the delay
    Navigate(Duration),
    Reload(Duration),
    Wait(Duration),
    Ping,
    SendKey,
    RegisterEngine,
    VerifyKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    WaitElapsed { engine_controls: bool },
    PingReplied { key_available: bool },
    /// Timeout, disconnect, or no controlling engine
    PingFailed,
    KeySetConfirmed,
    KeySetFailed,
    Registered,
    RegistrationFailed(String),
    KeyVerified,
    KeyInvalid,
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub state: BootState,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone)]
pub struct Machine {
    state: BootState,
    flow: Flow,
    content_loaded: bool,
    oauth_reload_delay: Duration,
    reload_delay: Duration,
}

impl Machine {
    pub fn new(config: &BootstrapConfig) -> Self {
        Self {
            state: BootState::Idle,
            flow: Flow::Start,
            content_loaded: false,
            oauth_reload_delay: config.oauth_reload_delay(),
            reload_delay: config.reload_delay(),
        }
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// Page-load decision; first matching rule wins.
    pub fn start(&mut self, page: &Snapshot) -> Step {
        self.flow = Flow::Start;
        self.content_loaded = page.content_loaded;

        if page.reload_in_progress {
            self.content_loaded = true;
            return self.go(
                BootState::Settled,
                vec![
                    Effect::ClearReloadFlag,
                    Effect::SetContentLoaded,
                    Effect::RenderEntryDocument,
                ],
            );
        }
        if page.content_loaded {
            return self.go(BootState::Settled, Vec::new());
        }

        let mut effects = Vec::new();
        if page.redirect_marker {
            effects.push(Effect::StripRedirectMarker);
        }
        if let Some(reason) = &page.credential_error {
            effects.push(Effect::ShowError(format!("Initialization failed: {reason}")));
            effects.push(Effect::ShowKeyEntry);
            return self.go(BootState::KeyEntryRequired, effects);
        }
        if !page.has_key {
            effects.push(Effect::ShowKeyEntry);
            return self.go(BootState::KeyEntryRequired, effects);
        }
        if page.redirect_marker {
            self.flow = Flow::ForcedLoad;
            effects.push(Effect::Wait(self.oauth_reload_delay));
            return self.go(BootState::ContentReloadScheduled, effects);
        }
        if page.engine_controls {
            effects.push(Effect::Ping);
            self.go(BootState::AwaitingEngineReply, effects)
        } else {
            effects.push(Effect::RegisterEngine);
            self.go(BootState::Registering, effects)
        }
    }

    /// Make sure the engine holds the key, then reload.
    pub fn force_content_load(&mut self, has_key: bool, engine_controls: bool) -> Step {
        if !has_key {
            self.flow = Flow::Start;
            return self.go(BootState::KeyEntryRequired, vec![Effect::ShowKeyEntry]);
        }
        self.flow = Flow::ForcedLoad;
        if engine_controls {
            self.go(BootState::AwaitingEngineReply, vec![Effect::Ping])
        } else {
            self.go(BootState::Registering, vec![Effect::RegisterEngine])
        }
    }

    /// A key typed into the key-entry UI.
    pub fn submit_key(&mut self, key_is_blank: bool) -> Step {
        if key_is_blank {
            return self.go(
                BootState::KeyEntryRequired,
                vec![Effect::ShowError(BLANK_KEY_MESSAGE.into())],
            );
        }
        self.flow = Flow::Submit;
        self.go(
            BootState::Registering,
            vec![Effect::PersistCredential, Effect::RegisterEngine],
        )
    }

    pub fn logout(&mut self) -> Step {
        self.flow = Flow::Start;
        self.content_loaded = false;
        self.go(
            BootState::Idle,
            vec![
                Effect::ClearSessionFlags,
                Effect::ClearEngineKey,
                Effect::UnregisterEngine,
                Effect::ClearCredential,
                Effect::Reload(Duration::ZERO),
            ],
        )
    }

    pub fn handle(&mut self, event: Event) -> Step {
        use BootState::*;

        match (self.state, event) {
            (ContentReloadScheduled, Event::WaitElapsed { engine_controls }) => {
                self.force_content_load(true, engine_controls)
            }

            (AwaitingEngineReply, Event::PingReplied { key_available: true }) => {
                if self.flow == Flow::ForcedLoad {
                    self.reload()
                } else if self.content_loaded {
                    self.go(Settled, vec![Effect::ShowLogoutControl])
                } else {
                    self.go(
                        ReloadPending,
                        vec![
                            Effect::ShowLogoutControl,
                            Effect::SetReloadFlag,
                            Effect::Navigate(self.reload_delay),
                        ],
                    )
                }
            }
            (AwaitingEngineReply, Event::PingReplied { key_available: false }) => {
                self.go(AwaitingEngineReply, vec![Effect::SendKey])
            }
            (AwaitingEngineReply, Event::PingFailed | Event::KeySetFailed) => {
                self.go(Registering, vec![Effect::RegisterEngine])
            }
            (AwaitingEngineReply | Registering, Event::KeySetConfirmed) => match self.flow {
                Flow::Start => self.go(Settled, vec![Effect::ShowLogoutControl]),
                Flow::ForcedLoad | Flow::Submit => self.reload(),
            },

            (Registering, Event::Registered) => self.go(Registering, vec![Effect::VerifyKey]),
            (Registering, Event::KeyVerified) => self.go(Registering, vec![Effect::SendKey]),
            (Registering, Event::KeyInvalid) => self.go(
                KeyEntryRequired,
                vec![
                    Effect::ClearCredential,
                    Effect::ShowError(INVALID_KEY_MESSAGE.into()),
                    Effect::ShowKeyEntry,
                ],
            ),
            (Registering, Event::KeySetFailed) => self.fail(KEY_DELIVERY_MESSAGE.into()),
            (Registering, Event::RegistrationFailed(reason)) => {
                self.fail(format!("Engine setup failed: {reason}"))
            }

            (_, Event::Unexpected(reason)) => self.fail(reason),

            (state, event) => {
                warn!(?state, ?event, "event ignored in this state");
                Step {
                    state,
                    effects: Vec::new(),
                }
            }
        }
    }

    fn fail(&mut self, message: String) -> Step {
        if self.flow == Flow::ForcedLoad {
            return self.reload();
        }
        self.go(
            BootState::KeyEntryRequired,
            vec![Effect::ShowError(message), Effect::ShowKeyEntry],
        )
    }

    fn reload(&mut self) -> Step {
        self.go(BootState::ReloadPending, vec![Effect::Reload(self.reload_delay)])
    }

    fn go(&mut self, state: BootState, effects: Vec<Effect>) -> Step {
        self.state = state;
        Step { state, effects }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        Machine::new(&BootstrapConfig::default())
    }

    fn with_key() -> Snapshot {
        Snapshot {
            has_key: true,
            ..Snapshot::default()
        }
    }

    const RELOAD: Duration = Duration::from_millis(100);

    #[test]
    fn reload_flag_wins() {
        let mut m = machine();
        let step = m.start(&Snapshot {
            reload_in_progress: true,
            content_loaded: true,
            has_key: true,
            redirect_marker: true,
            engine_controls: true,
            credential_error: None,
        });
        assert_eq!(step.state, BootState::Settled);
        assert_eq!(
            step.effects,
            vec![
                Effect::ClearReloadFlag,
                Effect::SetContentLoaded,
                Effect::RenderEntryDocument
            ]
        );
    }

    #[test]
    fn unreadable_credential_does_not_preempt_session_flags() {
        let mut m = machine();
        let step = m.start(&Snapshot {
            reload_in_progress: true,
            credential_error: Some("corrupt credential".into()),
            ..Snapshot::default()
        });
        assert_eq!(step.state, BootState::Settled);
        assert_eq!(step.effects[0], Effect::ClearReloadFlag);

        let mut m = machine();
        let step = m.start(&Snapshot {
            content_loaded: true,
            credential_error: Some("corrupt credential".into()),
            ..Snapshot::default()
        });
        assert_eq!(step, Step { state: BootState::Settled, effects: vec![] });

        let mut m = machine();
        let step = m.start(&Snapshot {
            redirect_marker: true,
            credential_error: Some("corrupt credential".into()),
            ..Snapshot::default()
        });
        assert_eq!(step.state, BootState::KeyEntryRequired);
        assert_eq!(
            step.effects,
            vec![
                Effect::StripRedirectMarker,
                Effect::ShowError("Initialization failed: corrupt credential".into()),
                Effect::ShowKeyEntry
            ]
        );
    }

    #[test]
    fn content_loaded_is_noop() {
        let mut m = machine();
        let step = m.start(&Snapshot {
            content_loaded: true,
            ..with_key()
        });
        assert_eq!(step, Step { state: BootState::Settled, effects: vec![] });
    }

    #[test]
    fn no_key_shows_entry() {
        let mut m = machine();
        let step = m.start(&Snapshot::default());
        assert_eq!(step.state, BootState::KeyEntryRequired);
        assert_eq!(step.effects, vec![Effect::ShowKeyEntry]);
    }

    #[test]
    fn marker_without_key_is_stripped_then_key_entry() {
        let mut m = machine();
        let step = m.start(&Snapshot {
            redirect_marker: true,
            ..Snapshot::default()
        });
        assert_eq!(
            step.effects,
            vec![Effect::StripRedirectMarker, Effect::ShowKeyEntry]
        );
    }

    #[test]
    fn marker_with_key_schedules_forced_load() {
        let mut m = machine();
        let step = m.start(&Snapshot {
            redirect_marker: true,
            engine_controls: true,
            ..with_key()
        });
        assert_eq!(step.state, BootState::ContentReloadScheduled);
        assert_eq!(
            step.effects,
            vec![
                Effect::StripRedirectMarker,
                Effect::Wait(Duration::from_millis(500))
            ]
        );

        let step = m.handle(Event::WaitElapsed {
            engine_controls: true,
        });
        assert_eq!(step.effects, vec![Effect::Ping]);

        // forced flow: a key-holding engine means reload
        let step = m.handle(Event::PingReplied {
            key_available: true,
        });
        assert_eq!(step.state, BootState::ReloadPending);
        assert_eq!(step.effects, vec![Effect::Reload(RELOAD)]);
    }

    #[test]
    fn controlled_engine_with_key_triggers_navigation() {
        let mut m = machine();
        let step = m.start(&Snapshot {
            engine_controls: true,
            ..with_key()
        });
        assert_eq!(step.state, BootState::AwaitingEngineReply);
        assert_eq!(step.effects, vec![Effect::Ping]);

        let step = m.handle(Event::PingReplied {
            key_available: true,
        });
        assert_eq!(step.state, BootState::ReloadPending);
        assert_eq!(
            step.effects,
            vec![
                Effect::ShowLogoutControl,
                Effect::SetReloadFlag,
                Effect::Navigate(RELOAD)
            ]
        );
    }

    #[test]
    fn keyless_engine_gets_key_without_reload() {
        let mut m = machine();
        m.start(&Snapshot {
            engine_controls: true,
            ..with_key()
        });
        let step = m.handle(Event::PingReplied {
            key_available: false,
        });
        assert_eq!(step.effects, vec![Effect::SendKey]);

        let step = m.handle(Event::KeySetConfirmed);
        assert_eq!(step.state, BootState::Settled);
        assert!(!step.effects.iter().any(|e| matches!(e, Effect::Reload(_) | Effect::Navigate(_))));
    }

    #[test]
    fn set_key_timeout_falls_back_to_registration() {
        let mut m = machine();
        m.start(&Snapshot {
            engine_controls: true,
            ..with_key()
        });
        m.handle(Event::PingReplied {
            key_available: false,
        });
        let step = m.handle(Event::KeySetFailed);
        assert_eq!(step.state, BootState::Registering);
        assert_eq!(step.effects, vec![Effect::RegisterEngine]);
    }

    #[test]
    fn transport_failure_registers_verifies_then_sends() {
        let mut m = machine();
        m.start(&Snapshot {
            engine_controls: true,
            ..with_key()
        });
        assert_eq!(m.handle(Event::PingFailed).effects, vec![Effect::RegisterEngine]);
        assert_eq!(m.handle(Event::Registered).effects, vec![Effect::VerifyKey]);
        assert_eq!(m.handle(Event::KeyVerified).effects, vec![Effect::SendKey]);
        let step = m.handle(Event::KeySetConfirmed);
        assert_eq!(step.state, BootState::Settled);
    }

    #[test]
    fn uncontrolled_page_goes_straight_to_registration() {
        let mut m = machine();
        let step = m.start(&with_key());
        assert_eq!(step.state, BootState::Registering);
        assert_eq!(step.effects, vec![Effect::RegisterEngine]);
    }

    #[test]
    fn invalid_key_clears_credential() {
        let mut m = machine();
        m.start(&with_key());
        m.handle(Event::Registered);
        let step = m.handle(Event::KeyInvalid);
        assert_eq!(step.state, BootState::KeyEntryRequired);
        assert_eq!(
            step.effects,
            vec![
                Effect::ClearCredential,
                Effect::ShowError(INVALID_KEY_MESSAGE.into()),
                Effect::ShowKeyEntry
            ]
        );
    }

    #[test]
    fn unexpected_failure_falls_back_to_key_entry() {
        let mut m = machine();
        let step = m.handle(Event::Unexpected("credential store unreadable".into()));
        assert_eq!(step.state, BootState::KeyEntryRequired);
        assert_eq!(
            step.effects,
            vec![
                Effect::ShowError("credential store unreadable".into()),
                Effect::ShowKeyEntry
            ]
        );
    }

    #[test]
    fn forced_load_failures_still_reload() {
        let mut m = machine();
        m.force_content_load(true, false);
        let step = m.handle(Event::RegistrationFailed("timeout".into()));
        assert_eq!(step.state, BootState::ReloadPending);
        assert_eq!(step.effects, vec![Effect::Reload(RELOAD)]);
    }

    #[test]
    fn forced_load_with_keyless_engine_sends_then_reloads() {
        let mut m = machine();
        m.force_content_load(true, true);
        assert_eq!(
            m.handle(Event::PingReplied {
                key_available: false
            })
            .effects,
            vec![Effect::SendKey]
        );
        assert_eq!(
            m.handle(Event::KeySetConfirmed).effects,
            vec![Effect::Reload(RELOAD)]
        );
    }

    #[test]
    fn submit_flow() {
        let mut m = machine();
        let step = m.submit_key(true);
        assert_eq!(
            step.effects,
            vec![Effect::ShowError(BLANK_KEY_MESSAGE.into())]
        );

        let step = m.submit_key(false);
        assert_eq!(
            step.effects,
            vec![Effect::PersistCredential, Effect::RegisterEngine]
        );
        m.handle(Event::Registered);
        m.handle(Event::KeyVerified);
        let step = m.handle(Event::KeySetConfirmed);
        assert_eq!(step.effects, vec![Effect::Reload(RELOAD)]);
    }

    #[test]
    fn logout_resets_everything() {
        let mut m = machine();
        let step = m.logout();
        assert_eq!(step.state, BootState::Idle);
        assert_eq!(
            step.effects,
            vec![
                Effect::ClearSessionFlags,
                Effect::ClearEngineKey,
                Effect::UnregisterEngine,
                Effect::ClearCredential,
                Effect::Reload(Duration::ZERO)
            ]
        );
    }

    #[test]
    fn stray_events_are_ignored() {
        let mut m = machine();
        m.start(&Snapshot::default());
        let step = m.handle(Event::KeyVerified);
        assert_eq!(step.state, BootState::KeyEntryRequired);
        assert!(step.effects.is_empty());
    }
}

//! In-memory key state
//!
//! Concurrent requests share one slot. Every transition is a single
//! assignment under the lock, never a read-modify-write sequence, and a
//! decode failure clears the slot unconditionally.

use std::sync::{Arc, RwLock};

use secrecy::SecretString;

/// The two states the engine can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NoKey,
    KeyPresent,
}

/// Holder for the engine's passphrase.
pub trait KeyState: Send + Sync {
    fn get(&self) -> Option<Arc<SecretString>>;
    fn set(&self, key: Option<SecretString>);
}

#[derive(Default)]
pub struct MemoryKeyState {
    slot: RwLock<Option<Arc<SecretString>>>,
}

impl MemoryKeyState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyState for MemoryKeyState {
    fn get(&self) -> Option<Arc<SecretString>> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, key: Option<SecretString>) {
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = key.map(Arc::new);
    }
}

impl std::fmt::Debug for MemoryKeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let present = self.get().is_some();
        f.debug_struct("MemoryKeyState")
            .field("key_present", &present)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn starts_absent() {
        let state = MemoryKeyState::new();
        assert!(state.get().is_none());
    }

    #[test]
    fn set_then_clear() {
        let state = MemoryKeyState::new();
        state.set(Some(SecretString::from("abc")));
        assert_eq!(state.get().unwrap().expose_secret(), "abc");

        state.set(None);
        assert!(state.get().is_none());
    }

    #[test]
    fn held_key_survives_replacement() {
        let state = MemoryKeyState::new();
        state.set(Some(SecretString::from("first")));
        let in_flight = state.get().unwrap();

        state.set(Some(SecretString::from("second")));

        // a request that already read the key keeps using it
        assert_eq!(in_flight.expose_secret(), "first");
        assert_eq!(state.get().unwrap().expose_secret(), "second");
    }

    #[test]
    fn debug_does_not_leak() {
        let state = MemoryKeyState::new();
        state.set(Some(SecretString::from("hunter2")));
        let rendered = format!("{state:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("key_present: true"));
    }
}

//! Page-session flags
//!
//! Two flags survive a same-tab navigation but not a new session. They are
//! what stops the controlled reload from looping: the reload sets
//! `ReloadInProgress`, the reloaded page converts it into `ContentLoaded`.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionFlag {
    ReloadInProgress,
    ContentLoaded,
}

impl SessionFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionFlag::ReloadInProgress => "sw_reload_in_progress",
            SessionFlag::ContentLoaded => "content_loaded",
        }
    }
}

/// Flag set for hosts without their own session storage
#[derive(Debug, Default)]
pub struct MemorySession {
    flags: Mutex<HashSet<SessionFlag>>,
}

impl MemorySession {
    pub fn get(&self, flag: SessionFlag) -> bool {
        self.flags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&flag)
    }

    pub fn set(&self, flag: SessionFlag, on: bool) {
        let mut flags = self
            .flags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if on {
            flags.insert(flag);
        } else {
            flags.remove(&flag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let session = MemorySession::default();
        assert!(!session.get(SessionFlag::ContentLoaded));

        session.set(SessionFlag::ContentLoaded, true);
        assert!(session.get(SessionFlag::ContentLoaded));
        assert!(!session.get(SessionFlag::ReloadInProgress));

        session.set(SessionFlag::ContentLoaded, false);
        assert!(!session.get(SessionFlag::ContentLoaded));
    }

    #[test]
    fn storage_names() {
        assert_eq!(SessionFlag::ReloadInProgress.as_str(), "sw_reload_in_progress");
        assert_eq!(SessionFlag::ContentLoaded.as_str(), "content_loaded");
    }
}

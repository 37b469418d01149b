//! Key transport messages
//!
//! Wire shapes (JSON, discriminated by `type`):
//!
//! ```text
//! page → engine   {"type":"SET_KEY","key":"..."}   {"type":"CLEAR_KEY"}   {"type":"PING"}
//! engine → page   {"type":"KEY_SET","success":true} {"type":"PONG","keyAvailable":false}
//! ```
//!
//! `CLEAR_KEY` has no reply.

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    SetKey { key: String },
    ClearKey,
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    KeySet {
        success: bool,
    },
    Pong {
        #[serde(rename = "keyAvailable")]
        key_available: bool,
    },
}

impl Message {
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Message::ClearKey)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::SetKey { .. } => "SET_KEY",
            Message::ClearKey => "CLEAR_KEY",
            Message::Ping => "PING",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

impl Reply {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

// SET_KEY carries the passphrase; keep it out of logs.
impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::SetKey { .. } => f
                .debug_struct("SetKey")
                .field("key", &"[REDACTED]")
                .finish(),
            Message::ClearKey => f.write_str("ClearKey"),
            Message::Ping => f.write_str("Ping"),
        }
    }
}

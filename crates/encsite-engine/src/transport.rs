//! Page ↔ engine message channel
//!
//! Messages travel over a bounded mpsc inbox. A message that expects a reply
//! carries its own oneshot port, so concurrent calls never see each other's
//! replies; there is no ordering guarantee across distinct calls. Every
//! reply-expecting call is bounded by a timeout, and a timeout says nothing
//! about the engine's key state.

use std::sync::Arc;
use std::time::Duration;

use encsite_core::config::TransportConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::lifecycle::EventHandlers;
use crate::protocol::{Message, Reply};

/// One message plus the port its reply goes to
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub reply: Option<oneshot::Sender<Reply>>,
}

/// Create a connected (page handle, engine inbox) pair.
pub fn channel(config: &TransportConfig) -> (EngineHandle, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let handle = EngineHandle {
        tx,
        ping_timeout: config.ping_timeout(),
        key_confirm_timeout: config.key_confirm_timeout(),
    };
    (handle, rx)
}

/// Engine-side loop: dispatch every envelope to `handlers` until all handles are dropped.
pub async fn serve<H: EventHandlers>(handlers: Arc<H>, mut inbox: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { message, reply }) = inbox.recv().await {
        let name = message.name();
        match (handlers.on_message(message), reply) {
            (Some(answer), Some(port)) => {
                if port.send(answer).is_err() {
                    debug!(message = name, "caller gave up before the reply");
                }
            }
            (Some(_), None) => warn!(message = name, "reply produced but no port attached"),
            (None, _) => {}
        }
    }
    debug!("engine inbox closed");
}

/// Page-side handle to a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Envelope>,
    ping_timeout: Duration,
    key_confirm_timeout: Duration,
}

impl EngineHandle {
    /// PING; `Ok(true)` when the engine holds a key.
    pub async fn ping(&self) -> Result<bool, TransportError> {
        self.ping_within(self.ping_timeout).await
    }

    /// PING with a caller-chosen timeout.
    pub async fn ping_within(&self, limit: Duration) -> Result<bool, TransportError> {
        match self.request(Message::Ping, limit).await? {
            Reply::Pong { key_available } => Ok(key_available),
            other => Err(TransportError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// SET_KEY and wait for the engine's confirmation.
    pub async fn set_key(&self, key: &str) -> Result<(), TransportError> {
        let message = Message::SetKey {
            key: key.to_string(),
        };
        match self.request(message, self.key_confirm_timeout).await? {
            Reply::KeySet { success: true } => Ok(()),
            Reply::KeySet { success: false } => Err(TransportError::Rejected),
            other => Err(TransportError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// CLEAR_KEY; fire-and-forget, there is no reply to wait for.
    pub async fn clear_key(&self) -> Result<(), TransportError> {
        self.tx
            .send(Envelope {
                message: Message::ClearKey,
                reply: None,
            })
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn request(&self, message: Message, limit: Duration) -> Result<Reply, TransportError> {
        let (port, answer) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(Envelope {
                    message,
                    reply: Some(port),
                })
                .await
                .map_err(|_| TransportError::Disconnected)?;
            answer.await.map_err(|_| TransportError::NoReply)
        };

        tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| TransportError::Timeout(limit))?
    }
}

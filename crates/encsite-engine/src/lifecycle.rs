//! Worker lifecycle seam
//!
//! A host (browser worker runtime, [`crate::registry::LocalRegistry`], a test
//! harness) drives the engine through four handlers. Install and activate
//! receive a [`WorkerScope`] so the engine can take control of open pages
//! immediately instead of waiting for them to be reloaded.

use std::future::Future;

use bytes::Bytes;
use http::Response;

use crate::engine::ContentRequest;
use crate::protocol::{Message, Reply};

/// Host operations available during install/activate.
pub trait WorkerScope: Send + Sync {
    /// Activate without waiting for pages controlled by a previous worker to close.
    fn skip_waiting(&self);
    /// Take control of every page already open in scope.
    fn claim_clients(&self);
}

/// What the engine did with a fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not handled; the host performs the network request unchanged
    PassThrough,
    /// Synthesized response
    Respond(Response<Bytes>),
}

impl FetchOutcome {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, FetchOutcome::PassThrough)
    }

    pub fn into_response(self) -> Option<Response<Bytes>> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Respond(resp) => Some(resp),
        }
    }
}

pub trait EventHandlers: Send + Sync {
    fn on_install(&self, scope: &dyn WorkerScope);

    fn on_activate(&self, scope: &dyn WorkerScope);

    fn on_fetch(&self, request: ContentRequest) -> impl Future<Output = FetchOutcome> + Send;

    /// Handle one protocol message; `None` when the message has no reply.
    fn on_message(&self, message: Message) -> Option<Reply>;
}

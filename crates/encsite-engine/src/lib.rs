//! encsite-engine: the request-interception decryption engine
//!
//! The engine sits between a page and the static host. It holds the site
//! passphrase in memory, gates every same-origin request, and for content
//! paths fetches `enc/<path>.enc`, decrypts it, and answers with plaintext.
//!
//! Hosting is abstracted behind four lifecycle handlers
//! ([`lifecycle::EventHandlers`]); [`registry::LocalRegistry`] runs an engine
//! in-process and wires up the key transport channel.

pub mod engine;
pub mod error;
pub mod inject;
pub mod lifecycle;
pub mod policy;
pub mod protocol;
pub mod registry;
pub mod response;
pub mod source;
pub mod state;
pub mod transport;

pub use engine::{ContentRequest, Engine};
pub use error::{RegistryError, TransportError, UpstreamError};
pub use lifecycle::{EventHandlers, FetchOutcome, WorkerScope};
pub use protocol::{Message, Reply};
pub use registry::LocalRegistry;
pub use source::{AssetSource, OperatorSource};
pub use state::{EngineState, KeyState, MemoryKeyState};
pub use transport::{EngineHandle, Envelope};

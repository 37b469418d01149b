//! encsite-bootstrap: the page-side half of the encrypted site
//!
//! On every page load the bootstrap decides what to do with a persisted key:
//! hand it to the engine, trigger the controlled reload that lets the engine
//! serve decrypted content, register the engine from scratch, or fall back to
//! key entry. The decision logic is a pure state machine ([`machine`]); the
//! [`orchestrator`] executes its effects against host seams.
//!
//! Keys come from manual entry or an OAuth 2.0 + PKCE flow ([`acquire`]).

pub mod acquire;
pub mod credential;
pub mod error;
pub mod machine;
pub mod orchestrator;
pub mod session;
pub mod verify;

pub use acquire::{
    AuthState, AuthStateStore, AuthorizationRequest, FixedKeySource, IdentityProvider, KeyInfo,
    ManualKeySource, MemoryAuthStateStore, OAuthClient, OidcConfig, TokenResponse,
};
pub use credential::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{AuthFlowError, VerifyError};
pub use machine::{BootState, Effect, Event, Machine, Step};
pub use orchestrator::{Bootstrap, EngineRegistry, PageHost};
pub use session::{MemorySession, SessionFlag};
pub use verify::KeyProbe;

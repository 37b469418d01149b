pub mod config;
pub mod error;

pub use config::SiteConfig;
pub use error::{EncsiteError, EncsiteResult};

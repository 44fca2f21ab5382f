//! Shared types, config, and error definitions for airwatch.

pub mod config;
pub mod error;
pub mod record;
pub mod types;

pub use config::AppConfig;
pub use error::Error;
pub use record::{ProviderLocationRecord, ProviderSensor};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

//! Configuration and startup wiring for the easel bot core.
//!
//! The Discord front end and the provider scrapers consume the assembled
//! [`Service`]; this crate owns backend selection and component
//! lifecycle.

pub mod config;
pub mod service;

pub use config::{Config, ConfigError, RepostBackend};
pub use service::Service;

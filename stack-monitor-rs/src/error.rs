//! Error types for the monitoring core.
//!
//! Business-level conditions (unknown session, disabled rule, cooldown
//! suppression) are expressed as `Option`/`bool` returns on the public
//! operations, never as errors. The variants here cover configuration,
//! persistence, and notification plumbing.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Event routing error: {0}")]
    Routing(String),
}

//! Error types for configuration loading and listener startup
//!
//! Forwarders have no error type: transport failures are folded into their
//! return values and never reach the caller.

use thiserror::Error;

/// Configuration problems detected at load time. Any of these refuses startup
/// of the affected component.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("route table has no 'default' entry")]
    MissingDefaultRoute,

    #[error("route '{event_type}' references unknown service '{destination}'")]
    UnknownService {
        event_type: String,
        destination: String,
    },

    #[error("service '{name}' has an invalid URL: {url}")]
    InvalidServiceUrl { name: String, url: String },

    #[error("invalid normalizer URL: {0}")]
    InvalidNormalizerUrl(String),

    #[error("invalid bind address for {listener} listener: {address}")]
    InvalidBindAddress { listener: String, address: String },

    #[error("invalid port {port} for {listener} listener")]
    InvalidPort { listener: String, port: u16 },

    #[error("port conflict: multiple listeners configured for {0}")]
    PortConflict(String),

    #[error("invalid {field} for {listener} listener: must be greater than zero")]
    InvalidLimit {
        listener: String,
        field: &'static str,
    },

    #[error("invalid {section} timeout_seconds: must be greater than zero")]
    InvalidTimeout { section: &'static str },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Listener lifecycle failures. Only binding can fail; a bound listener keeps
/// running until stopped.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {kind} listener to {address}: {source}")]
    Bind {
        kind: String,
        address: String,
        #[source]
        source: std::io::Error,
    },
}

impl ListenerError {
    pub fn bind(kind: impl Into<String>, address: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            kind: kind.into(),
            address: address.into(),
            source,
        }
    }
}

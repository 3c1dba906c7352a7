//! The event record that flows from the listeners and the API paths through
//! normalization, classification and routing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;

pub const SOURCE_SYSLOG: &str = "syslog";
pub const SOURCE_SNMP_TRAP: &str = "snmp_trap";
pub const SOURCE_METADATA_API: &str = "metadata_api";
pub const SOURCE_API: &str = "api";

fn default_source() -> String {
    SOURCE_API.to_string()
}

/// A single ingested event.
///
/// `source` is fixed by whichever collaborator created the event and has no
/// setter. Exactly one payload field is populated, depending on origin:
/// `raw_message` (syslog), `raw_trap_bytes_hex` (trap), `message` (API) or
/// `metadata` (metadata submission).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_trap_bytes_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Event {
    fn with_source(source: &str) -> Self {
        Self {
            event_type: None,
            message: None,
            severity: None,
            source: source.to_string(),
            remote_addr: None,
            raw_message: None,
            raw_trap_bytes_hex: None,
            metadata: None,
        }
    }

    /// Event for one line-protocol datagram.
    pub fn syslog(remote_addr: SocketAddr, raw_message: String) -> Self {
        Self {
            remote_addr: Some(remote_addr.ip().to_string()),
            raw_message: Some(raw_message),
            ..Self::with_source(SOURCE_SYSLOG)
        }
    }

    /// Event for one trap datagram. The bytes are carried as lowercase hex,
    /// no trap decoding happens here.
    pub fn snmp_trap(remote_addr: SocketAddr, raw: &[u8]) -> Self {
        Self {
            remote_addr: Some(remote_addr.ip().to_string()),
            raw_trap_bytes_hex: Some(hex::encode(raw)),
            ..Self::with_source(SOURCE_SNMP_TRAP)
        }
    }

    /// Event wrapping an arbitrary metadata object from the metadata API.
    pub fn metadata(metadata: Value) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::with_source(SOURCE_METADATA_API)
        }
    }

    /// Event submitted directly through the event API.
    pub fn submitted(
        source: impl Into<String>,
        event_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let source: String = source.into();
        Self {
            event_type: Some(event_type.into()),
            message: Some(message.into()),
            ..Self::with_source(&source)
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Declared type, or `fallback` when the type is absent or empty.
    pub fn type_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.event_type.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => fallback,
        }
    }
}

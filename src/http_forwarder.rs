//! HTTP forwarding of events to the normalizer and to downstream services
//!
//! Both forwarders make exactly one attempt per call and never return an
//! error. The normalizer forwarder degrades into
//! [`NormalizerResult::Unreachable`]; the service forwarder reports
//! [`TRANSPORT_FAILURE_STATUS`] instead of an HTTP status.

use crate::config::NormalizerConfig;
use crate::error::ConfigError;
use crate::event::Event;
use reqwest::{Client, Url};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Status reported by the service forwarder when no HTTP response arrived.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

pub const NORMALIZER_UNREACHABLE: &str = "normalizer_unreachable";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one normalizer call.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizerResult {
    /// Decoded JSON body returned by the normalizer.
    Response(Value),
    /// Transport failure, timeout or undecodable body.
    Unreachable { error: String },
}

impl NormalizerResult {
    fn unreachable(error: impl fmt::Display) -> Self {
        let mut error = error.to_string();
        if error.is_empty() {
            error = "unknown error".to_string();
        }
        Self::Unreachable { error }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Response(body) => body.clone(),
            Self::Unreachable { error } => serde_json::json!({
                "status": NORMALIZER_UNREACHABLE,
                "error": error,
            }),
        }
    }
}

impl Serialize for NormalizerResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Response(body) => body.serialize(serializer),
            Self::Unreachable { error } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("status", NORMALIZER_UNREACHABLE)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

pub struct NormalizerForwarder {
    client: Client,
    url: String,
}

impl NormalizerForwarder {
    pub fn new(config: &NormalizerConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the event to the normalizer and return its decoded reply.
    pub async fn forward(&self, event: &Event) -> NormalizerResult {
        let response = match self.client.post(&self.url).json(event).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(source = event.source(), "Normalizer at {} unreachable: {}", self.url, e);
                return NormalizerResult::unreachable(e);
            }
        };

        let status = response.status();
        match response.json::<Value>().await {
            Ok(body) => {
                debug!(source = event.source(), status = status.as_u16(), "Event forwarded to normalizer");
                NormalizerResult::Response(body)
            }
            Err(e) => {
                warn!(
                    source = event.source(),
                    status = status.as_u16(),
                    "Normalizer returned an undecodable response: {}", e
                );
                NormalizerResult::unreachable(e)
            }
        }
    }
}

/// Posts events to downstream services resolved by the router.
pub struct ServiceForwarder {
    client: Client,
}

impl ServiceForwarder {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Send one event and return the response status code, or
    /// [`TRANSPORT_FAILURE_STATUS`] when the request did not complete.
    pub async fn send(&self, url: &str, event: &Event) -> u16 {
        match self.client.post(url).json(event).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    info!(url = %url, status = status.as_u16(), "Event delivered");
                } else {
                    let detail = match status.as_u16() {
                        404 => "endpoint not found, check service URL",
                        413 => "payload too large",
                        429 => "rate limit exceeded",
                        500..=599 => "downstream service error",
                        _ => "request rejected",
                    };
                    warn!(url = %url, status = status.as_u16(), "Delivery failed: {}", detail);
                }
                status.as_u16()
            }
            Err(e) => {
                warn!(url = %url, "Delivery failed, no response: {}", e);
                TRANSPORT_FAILURE_STATUS
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unreachable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// Probes `<origin>/health` of the normalizer and downstream services.
pub struct EndpointHealthChecker {
    client: Client,
}

impl EndpointHealthChecker {
    pub fn new() -> Result<Self, ConfigError> {
        let client = Client::builder().timeout(HEALTH_CHECK_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Check every named endpoint, keyed by name.
    pub async fn check_all<'a, I>(&self, endpoints: I) -> BTreeMap<String, HealthStatus>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut results = BTreeMap::new();
        for (name, url) in endpoints {
            results.insert(name.to_string(), self.check(url).await);
        }
        results
    }

    pub async fn check(&self, url: &str) -> HealthStatus {
        let Some(health_url) = health_url(url) else {
            return HealthStatus::Unreachable;
        };

        match self.client.get(health_url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Unhealthy,
            Err(_) => HealthStatus::Unreachable,
        }
    }
}

/// Health endpoint on the same origin as a service URL.
fn health_url(url: &str) -> Option<Url> {
    Url::parse(url).ok()?.join("/health").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unreachable_serializes_with_status_tag() {
        let result = NormalizerResult::Unreachable {
            error: "connection refused".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"status": "normalizer_unreachable", "error": "connection refused"})
        );
        assert_eq!(result.to_json(), serde_json::to_value(&result).unwrap());
    }

    #[test]
    fn test_response_serializes_verbatim() {
        let result = NormalizerResult::Response(json!({"normalized": true}));
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"normalized": true}));
        assert!(!result.is_unreachable());
    }

    #[test]
    fn test_unreachable_error_never_empty() {
        assert!(matches!(
            NormalizerResult::unreachable(""),
            NormalizerResult::Unreachable { error } if !error.is_empty()
        ));
    }

    #[test]
    fn test_health_url_replaces_path() {
        let url = health_url("http://localhost:8081/events").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8081/health");
        assert!(health_url("not a url").is_none());
    }

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Unreachable.to_string(), "unreachable");
    }
}

//! Configuration management for the ingestor
//!
//! The whole configuration is one JSON document, loaded once at startup and
//! treated as immutable afterwards. Components receive the section they need
//! by reference at construction time.

use crate::error::ConfigError;
use crate::router::{RouteTable, ServiceRegistry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listeners: ListenersConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenersConfig {
    #[serde(default = "ListenerConfig::syslog")]
    pub syslog: ListenerConfig,
    #[serde(default = "ListenerConfig::snmp")]
    pub snmp: ListenerConfig,
}

impl Default for ListenersConfig {
    fn default() -> Self {
        Self {
            syslog: ListenerConfig::syslog(),
            snmp: ListenerConfig::snmp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
    /// Upper bound on concurrently running payload handlers. `None` spawns
    /// one handler per datagram without limit.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

/// Largest UDP payload, so a default listener never cuts a datagram short.
fn default_max_packet_size() -> usize {
    65535
}

impl ListenerConfig {
    pub fn syslog() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 5514,
            max_packet_size: default_max_packet_size(),
            max_in_flight: None,
        }
    }

    pub fn snmp() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 9162,
            max_packet_size: default_max_packet_size(),
            max_in_flight: None,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddress {
                listener: name.to_string(),
                address: self.bind_address.clone(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort {
                listener: name.to_string(),
                port: self.port,
            });
        }
        if self.max_packet_size == 0 {
            return Err(ConfigError::InvalidLimit {
                listener: name.to_string(),
                field: "max_packet_size",
            });
        }
        if self.max_in_flight == Some(0) {
            return Err(ConfigError::InvalidLimit {
                listener: name.to_string(),
                field: "max_in_flight",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    pub url: String,
    #[serde(default = "default_normalizer_timeout")]
    pub timeout_seconds: u64,
}

fn default_normalizer_timeout() -> u64 {
    5
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8002/normalize".to_string(),
            timeout_seconds: default_normalizer_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Event type -> destination service name. Must contain `default`.
    pub routes: HashMap<String, String>,
    /// Destination service name -> URL.
    pub services: HashMap<String, String>,
    #[serde(default = "default_service_timeout")]
    pub timeout_seconds: u64,
}

fn default_service_timeout() -> u64 {
    10
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let mut routes = HashMap::new();
        routes.insert("critical".to_string(), "agents_api".to_string());
        routes.insert("warning".to_string(), "agents_api".to_string());
        routes.insert("default".to_string(), "rag_connector".to_string());

        let mut services = HashMap::new();
        services.insert("agents_api".to_string(), "http://localhost:8081/events".to_string());
        services.insert("rag_connector".to_string(), "http://localhost:8082/ingest".to_string());
        services.insert("context_retrieval".to_string(), "http://localhost:8083/context".to_string());

        Self {
            routes,
            services,
            timeout_seconds: default_service_timeout(),
        }
    }
}

impl RoutingConfig {
    /// Build the validated route table and service registry. Both must be
    /// consistent with each other: every routed destination has an address.
    pub fn build(&self) -> Result<(RouteTable, ServiceRegistry), ConfigError> {
        let table = RouteTable::new(self.routes.clone())?;
        let registry = ServiceRegistry::new(self.services.clone())?;

        for (event_type, destination) in table.entries() {
            if !registry.contains(destination) {
                return Err(ConfigError::UnknownService {
                    event_type: event_type.to_string(),
                    destination: destination.to_string(),
                });
            }
            debug!("Route '{}' -> '{}'", event_type, destination);
        }

        Ok((table, registry))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub console_output: bool,
    pub file_output: Option<String>,
    #[serde(default)]
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: None,
            rotation: LogRotation::Daily,
        }
    }
}

pub(crate) fn is_http_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from a JSON file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .context("Failed to read configuration file")?;

        let config: Config = serde_json::from_str(&content)
            .context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialise configuration")?;

        tokio::fs::write(path.as_ref(), content)
            .await
            .context("Failed to write configuration file")?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listeners.syslog.validate("syslog")?;
        self.listeners.snmp.validate("snmp")?;
        self.validate_port_conflicts()?;

        if !is_http_url(&self.normalizer.url) {
            return Err(ConfigError::InvalidNormalizerUrl(self.normalizer.url.clone()));
        }

        // A zero timeout makes every request fail; catch it before startup.
        if self.normalizer.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout { section: "normalizer" });
        }
        if self.routing.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout { section: "routing" });
        }

        self.routing.build()?;
        Ok(())
    }

    /// No two enabled listeners may share a bind address and port
    fn validate_port_conflicts(&self) -> Result<(), ConfigError> {
        let mut used_addresses = HashSet::new();

        for listener in [&self.listeners.syslog, &self.listeners.snmp] {
            if !listener.enabled {
                continue;
            }
            let address_key = listener.bind_addr();
            if !used_addresses.insert(address_key.clone()) {
                return Err(ConfigError::PortConflict(address_key));
            }
        }

        Ok(())
    }
}

//! Type-based routing of events to downstream services
//!
//! The route table and service registry are validated together when the
//! router is built. After that, routing cannot fail: the outcome of the
//! delivery attempt is carried in [`RoutingDecision::status`].

use crate::config::{is_http_url, RoutingConfig};
use crate::error::ConfigError;
use crate::event::Event;
use crate::http_forwarder::{ServiceForwarder, TRANSPORT_FAILURE_STATUS};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

/// Key every route table must carry; used for absent or unmapped types.
pub const DEFAULT_ROUTE: &str = "default";

/// Event type -> destination service name. Keys match case-sensitively.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<String, String>,
}

impl RouteTable {
    pub fn new(routes: HashMap<String, String>) -> Result<Self, ConfigError> {
        if !routes.contains_key(DEFAULT_ROUTE) {
            return Err(ConfigError::MissingDefaultRoute);
        }
        Ok(Self { routes })
    }

    /// Destination for an event type, falling back to the default route.
    pub fn resolve(&self, event_type: Option<&str>) -> &str {
        let key = match event_type {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_ROUTE,
        };
        self.routes
            .get(key)
            .or_else(|| self.routes.get(DEFAULT_ROUTE))
            .map(String::as_str)
            .unwrap_or(DEFAULT_ROUTE)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Destination service name -> URL.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: HashMap<String, String>,
}

impl ServiceRegistry {
    pub fn new(services: HashMap<String, String>) -> Result<Self, ConfigError> {
        for (name, url) in &services {
            if !is_http_url(url) {
                return Err(ConfigError::InvalidServiceUrl {
                    name: name.clone(),
                    url: url.clone(),
                });
            }
        }
        Ok(Self { services })
    }

    pub fn address(&self, name: &str) -> Option<&str> {
        self.services.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.services.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub destination: String,
    /// HTTP status from the destination, or [`TRANSPORT_FAILURE_STATUS`].
    pub status: u16,
}

impl RoutingDecision {
    pub fn delivered(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct Router {
    table: RouteTable,
    registry: ServiceRegistry,
    forwarder: ServiceForwarder,
}

impl Router {
    pub fn new(config: &RoutingConfig) -> Result<Self, ConfigError> {
        let (table, registry) = config.build()?;
        let forwarder = ServiceForwarder::new(Duration::from_secs(config.timeout_seconds))?;

        info!(
            "Router ready with {} route(s) over {} service(s)",
            table.len(),
            registry.services.len()
        );

        Ok(Self {
            table,
            registry,
            forwarder,
        })
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Name of the service an event would be sent to, without sending it.
    pub fn destination_for(&self, event: &Event) -> &str {
        self.table.resolve(event.event_type.as_deref())
    }

    /// Pick the destination for `event` and deliver it there.
    pub async fn route(&self, event: &Event) -> RoutingDecision {
        let destination = self.destination_for(event).to_string();

        let status = match self.registry.address(&destination) {
            Some(url) => {
                debug!(destination = %destination, url = %url, "Routing event of type {:?}", event.event_type);
                self.forwarder.send(url, event).await
            }
            None => {
                // Ruled out by validation in Router::new.
                error!(destination = %destination, "No address registered for destination");
                TRANSPORT_FAILURE_STATUS
            }
        };

        RoutingDecision {
            destination,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_table_requires_default() {
        let result = RouteTable::new(routes(&[("alert", "agents_api")]));
        assert!(matches!(result, Err(ConfigError::MissingDefaultRoute)));
    }

    #[test]
    fn test_resolve_mapped_type() {
        let table =
            RouteTable::new(routes(&[("alert", "agents_api"), ("default", "rag_connector")]))
                .unwrap();
        assert_eq!(table.resolve(Some("alert")), "agents_api");
    }

    #[test]
    fn test_resolve_unmapped_and_absent_fall_back_to_default() {
        let table =
            RouteTable::new(routes(&[("alert", "agents_api"), ("default", "rag_connector")]))
                .unwrap();
        assert_eq!(table.resolve(Some("metrics")), "rag_connector");
        assert_eq!(table.resolve(None), "rag_connector");
        assert_eq!(table.resolve(Some("")), "rag_connector");
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let table =
            RouteTable::new(routes(&[("alert", "agents_api"), ("default", "rag_connector")]))
                .unwrap();
        assert_eq!(table.resolve(Some("ALERT")), "rag_connector");
    }

    #[test]
    fn test_registry_rejects_non_http_url() {
        let result = ServiceRegistry::new(routes(&[("agents_api", "localhost:8081")]));
        assert!(matches!(result, Err(ConfigError::InvalidServiceUrl { .. })));
    }

    #[test]
    fn test_router_rejects_unresolvable_destination() {
        let config = RoutingConfig {
            routes: routes(&[("alert", "agents_api"), ("default", "rag_connector")]),
            services: routes(&[("rag_connector", "http://localhost:8082/ingest")]),
            timeout_seconds: 1,
        };
        assert!(matches!(
            Router::new(&config),
            Err(ConfigError::UnknownService { .. })
        ));
    }

    #[test]
    fn test_destination_for_event() {
        let config = RoutingConfig {
            routes: routes(&[("alert", "agents_api"), ("default", "rag_connector")]),
            services: routes(&[
                ("agents_api", "http://localhost:8081/events"),
                ("rag_connector", "http://localhost:8082/ingest"),
            ]),
            timeout_seconds: 1,
        };
        let router = Router::new(&config).unwrap();

        let alert = Event::submitted("api", "alert", "link flap");
        assert_eq!(router.destination_for(&alert), "agents_api");

        let untyped = Event::metadata(serde_json::json!({}));
        assert_eq!(router.destination_for(&untyped), "rag_connector");
    }

    #[test]
    fn test_decision_delivered_only_for_2xx() {
        let ok = RoutingDecision { destination: "a".into(), status: 202 };
        let failed = RoutingDecision { destination: "a".into(), status: TRANSPORT_FAILURE_STATUS };
        assert!(ok.delivered());
        assert!(!failed.delivered());
    }
}

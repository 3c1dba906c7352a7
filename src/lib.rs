//! Ingestor library
//!
//! Event ingestion and routing pipeline: UDP listeners for syslog-style lines
//! and SNMP-style traps, a normalizer forwarder that degrades instead of
//! failing, a pluggable event classifier, and a type-based router that
//! delivers events to configured downstream services.

pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod http_forwarder;
pub mod ingest;
pub mod listener;
pub mod router;

pub use classifier::{classify, ClassificationResult, Classifier, RuleClassifier, Severity};
pub use config::Config;
pub use error::{ConfigError, ListenerError};
pub use event::Event;
pub use http_forwarder::{EndpointHealthChecker, NormalizerForwarder, NormalizerResult, ServiceForwarder};
pub use ingest::{submit_metadata, MetadataReceipt};
pub use listener::{start_listener, ListenerHandle, ListenerKind, PayloadHandler};
pub use router::{RouteTable, Router, RoutingDecision, ServiceRegistry};

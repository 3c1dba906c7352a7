//! Event classification
//!
//! [`RuleClassifier`] is a fixed decision table keyed on the event type. It
//! sits behind the [`Classifier`] trait so a content-aware classifier can
//! replace it without touching callers.

use crate::event::Event;
use serde::Serialize;
use std::fmt;

/// Type assumed for events that do not declare one.
pub const UNKNOWN_TYPE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub severity: Severity,
    pub explanation: String,
    pub recommended_action: String,
}

impl ClassificationResult {
    fn new(severity: Severity, explanation: &str, recommended_action: &str) -> Self {
        Self {
            severity,
            explanation: explanation.to_string(),
            recommended_action: recommended_action.to_string(),
        }
    }
}

/// Assigns severity, explanation and recommended action to an event.
/// Implementations must be total: every event gets a result.
pub trait Classifier: Send + Sync {
    fn classify(&self, event: &Event) -> ClassificationResult;
}

impl<F> Classifier for F
where
    F: Fn(&Event) -> ClassificationResult + Send + Sync,
{
    fn classify(&self, event: &Event) -> ClassificationResult {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl Classifier for RuleClassifier {
    fn classify(&self, event: &Event) -> ClassificationResult {
        // Exact match after lowercasing; only these two types are special.
        match event.type_or(UNKNOWN_TYPE).to_lowercase().as_str() {
            "critical" => ClassificationResult::new(
                Severity::High,
                "Critical event received. Detailed AI analysis pending.",
                "Immediate attention recommended.",
            ),
            "warning" => ClassificationResult::new(
                Severity::Medium,
                "Warning event received. Monitoring advised.",
                "Check logs and device health soon.",
            ),
            _ => ClassificationResult::new(
                Severity::Low,
                "Informational or unknown event type.",
                "No immediate action required.",
            ),
        }
    }
}

/// Classify with the built-in rule table.
pub fn classify(event: &Event) -> ClassificationResult {
    RuleClassifier.classify(event)
}

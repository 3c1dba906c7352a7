//! Metadata submission path
//!
//! The HTTP endpoint that accepts metadata lives outside this crate; it hands
//! the JSON object here and returns the receipt as its response body.

use crate::event::Event;
use crate::http_forwarder::{NormalizerForwarder, NormalizerResult};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataReceipt {
    pub status: &'static str,
    pub forwarded_to: &'static str,
    pub normalizer_response: NormalizerResult,
}

/// Wrap `metadata` as a `metadata_api` event, forward it, and report the
/// normalizer's reply verbatim. Never fails.
pub async fn submit_metadata(normalizer: &NormalizerForwarder, metadata: Value) -> MetadataReceipt {
    let event = Event::metadata(metadata);
    let normalizer_response = normalizer.forward(&event).await;

    MetadataReceipt {
        status: "received",
        forwarded_to: "normalizer",
        normalizer_response,
    }
}

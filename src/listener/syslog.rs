//! Line-protocol (syslog style) listener handler
//!
//! One datagram is one log line. The payload is decoded as UTF-8 with
//! invalid bytes dropped, trailing whitespace removed, and forwarded to the
//! normalizer.

use super::PayloadHandler;
use crate::event::Event;
use crate::http_forwarder::NormalizerForwarder;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

pub struct SyslogHandler {
    normalizer: Arc<NormalizerForwarder>,
}

impl SyslogHandler {
    pub fn new(normalizer: Arc<NormalizerForwarder>) -> Self {
        Self { normalizer }
    }
}

#[async_trait]
impl PayloadHandler for SyslogHandler {
    async fn handle(&self, payload: Vec<u8>, remote_addr: SocketAddr) {
        debug!(remote_addr = %remote_addr, "Syslog datagram ({} bytes)", payload.len());
        let event = Event::syslog(remote_addr, decode_line(&payload));

        // Fire and forget: failures are logged by the forwarder.
        let _ = self.normalizer.forward(&event).await;
    }
}

/// Lossy UTF-8 decode that drops invalid sequences rather than replacing them.
pub fn decode_line(payload: &[u8]) -> String {
    let mut line = String::with_capacity(payload.len());
    for chunk in payload.utf8_chunks() {
        line.push_str(chunk.valid());
    }
    line.truncate(line.trim_end().len());
    line
}

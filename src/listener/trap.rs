//! Trap (SNMP style) listener handler
//!
//! The datagram is treated as opaque bytes: no BER decoding, no version or
//! community checks. It is hex encoded and forwarded to the normalizer.

use super::PayloadHandler;
use crate::event::Event;
use crate::http_forwarder::NormalizerForwarder;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

pub struct TrapHandler {
    normalizer: Arc<NormalizerForwarder>,
}

impl TrapHandler {
    pub fn new(normalizer: Arc<NormalizerForwarder>) -> Self {
        Self { normalizer }
    }
}

#[async_trait]
impl PayloadHandler for TrapHandler {
    async fn handle(&self, payload: Vec<u8>, remote_addr: SocketAddr) {
        debug!(remote_addr = %remote_addr, "Trap datagram ({} bytes)", payload.len());
        let event = Event::snmp_trap(remote_addr, &payload);
        let _ = self.normalizer.forward(&event).await;
    }
}

//! Datagram listener framework
//!
//! A listener binds one UDP socket and runs an accept loop on its own task.
//! Every received datagram is handed to a [`PayloadHandler`] on a freshly
//! spawned task, so a slow handler never delays the next `recv_from`.
//!
//! By default fan-out is unbounded: one task per datagram, no queue. Setting
//! `max_in_flight` bounds it with a semaphore and drops datagrams that arrive
//! while the bound is reached.

pub mod syslog;
pub mod trap;

pub use syslog::SyslogHandler;
pub use trap::TrapHandler;

use crate::config::ListenerConfig;
use crate::error::ListenerError;
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Syslog,
    SnmpTrap,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syslog => f.write_str("syslog"),
            Self::SnmpTrap => f.write_str("snmp_trap"),
        }
    }
}

/// Callback invoked once per received datagram.
#[async_trait]
pub trait PayloadHandler: Send + Sync + 'static {
    async fn handle(&self, payload: Vec<u8>, remote_addr: SocketAddr);
}

/// Running listener. Dropping the handle stops the accept loop as well.
pub struct ListenerHandle {
    kind: ListenerKind,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// Address actually bound, useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the accept loop and release the socket. Handlers already running
    /// are left to finish on their own.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // Loop already gone: nothing to signal.
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("{} listener task ended abnormally: {}", self.kind, e);
                }
            }
        }
        info!("{} listener on {} stopped", self.kind, self.local_addr);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Bind `config.bind_address:config.port` and start accepting datagrams.
///
/// Binding happens before this returns, so an address in use or an invalid
/// address is reported here and nothing is spawned.
pub async fn start_listener<H: PayloadHandler>(
    kind: ListenerKind,
    config: &ListenerConfig,
    handler: Arc<H>,
) -> Result<ListenerHandle, ListenerError> {
    let bind_addr = config.bind_addr();
    let socket = UdpSocket::bind(&bind_addr)
        .await
        .map_err(|e| ListenerError::bind(kind.to_string(), &bind_addr, e))?;
    let local_addr = socket
        .local_addr()
        .map_err(|e| ListenerError::bind(kind.to_string(), &bind_addr, e))?;

    info!("{} listener started on {}", kind, local_addr);

    let accept_loop = AcceptLoop {
        kind,
        socket,
        handler,
        max_packet_size: config.max_packet_size,
        limiter: config.max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(accept_loop.run(shutdown_rx));

    Ok(ListenerHandle {
        kind,
        local_addr,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    })
}

struct AcceptLoop<H> {
    kind: ListenerKind,
    socket: UdpSocket,
    handler: Arc<H>,
    max_packet_size: usize,
    limiter: Option<Arc<Semaphore>>,
}

impl<H: PayloadHandler> AcceptLoop<H> {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        // One spare byte tells an oversized datagram apart from one that fits exactly.
        let mut buffer = vec![0u8; self.max_packet_size + 1];
        let mut packet_count = 0u64;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("{} listener received stop signal", self.kind);
                    break;
                }
                received = self.socket.recv_from(&mut buffer) => {
                    match received {
                        Ok((mut len, remote_addr)) => {
                            packet_count += 1;
                            if packet_count % 1000 == 0 {
                                info!("Received {} datagrams on {} listener", packet_count, self.kind);
                            }
                            if len > self.max_packet_size {
                                warn!(
                                    remote_addr = %remote_addr,
                                    "{} listener truncated datagram to max_packet_size ({} bytes)",
                                    self.kind,
                                    self.max_packet_size
                                );
                                len = self.max_packet_size;
                            }
                            self.dispatch(buffer[..len].to_vec(), remote_addr);
                        }
                        Err(e) => {
                            // One bad receive must not end the loop. Back off so a
                            // persistent socket error does not spin the task.
                            error!("{} listener failed to receive datagram: {}", self.kind, e);
                            tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&self, payload: Vec<u8>, remote_addr: SocketAddr) {
        let permit = match &self.limiter {
            Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(
                        remote_addr = %remote_addr,
                        "{} listener at capacity, dropping datagram ({} bytes)",
                        self.kind,
                        payload.len()
                    );
                    return;
                }
            },
            None => None,
        };

        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            handler.handle(payload, remote_addr).await;
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio::sync::{mpsc, Notify};
    use tokio::time::timeout;

    struct ChannelHandler {
        tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    }

    #[async_trait]
    impl PayloadHandler for ChannelHandler {
        async fn handle(&self, payload: Vec<u8>, remote_addr: SocketAddr) {
            let _ = self.tx.send((payload, remote_addr));
        }
    }

    /// Reports arrival, then waits until released.
    struct GatedHandler {
        tx: mpsc::UnboundedSender<Vec<u8>>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl PayloadHandler for GatedHandler {
        async fn handle(&self, payload: Vec<u8>, _remote_addr: SocketAddr) {
            let _ = self.tx.send(payload);
            self.gate.notified().await;
        }
    }

    fn local_config() -> ListenerConfig {
        ListenerConfig {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            max_packet_size: 8192,
            max_in_flight: None,
        }
    }

    #[tokio::test]
    async fn test_each_datagram_reaches_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = start_listener(ListenerKind::Syslog, &local_config(), Arc::new(ChannelHandler { tx }))
            .await
            .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for i in 0..20 {
            client
                .send_to(format!("line {}", i).as_bytes(), handle.local_addr())
                .await
                .unwrap();
        }

        let mut seen = HashSet::new();
        for _ in 0..20 {
            let (payload, remote) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            assert_eq!(remote, client.local_addr().unwrap());
            seen.insert(String::from_utf8(payload).unwrap());
        }
        assert_eq!(seen.len(), 20);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = Arc::new(ChannelHandler { tx });
        let first = start_listener(ListenerKind::Syslog, &local_config(), Arc::clone(&handler))
            .await
            .unwrap();

        let mut taken = local_config();
        taken.port = first.local_addr().port();
        let result = start_listener(ListenerKind::SnmpTrap, &taken, handler).await;
        assert!(matches!(result, Err(ListenerError::Bind { .. })));

        first.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_host_is_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = local_config();
        config.bind_address = "300.1.1.1".to_string();
        let result = start_listener(ListenerKind::Syslog, &config, Arc::new(ChannelHandler { tx })).await;
        assert!(matches!(result, Err(ListenerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_stop_releases_socket() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = Arc::new(ChannelHandler { tx });
        let handle = start_listener(ListenerKind::Syslog, &local_config(), Arc::clone(&handler))
            .await
            .unwrap();
        let mut same_port = local_config();
        same_port.port = handle.local_addr().port();

        handle.stop().await;

        let rebound = start_listener(ListenerKind::Syslog, &same_port, handler).await.unwrap();
        rebound.stop().await;
    }

    #[tokio::test]
    async fn test_bounded_fan_out_drops_when_full() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Notify::new());
        let mut config = local_config();
        config.max_in_flight = Some(1);
        let handle = start_listener(
            ListenerKind::SnmpTrap,
            &config,
            Arc::new(GatedHandler { tx, gate: Arc::clone(&gate) }),
        )
        .await
        .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"first", handle.local_addr()).await.unwrap();
        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, b"first");

        client.send_to(b"second", handle.local_addr()).await.unwrap();
        client.send_to(b"third", handle.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.send_to(b"fourth", handle.local_addr()).await.unwrap();
        let next = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(next, b"fourth");

        gate.notify_one();
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_oversized_datagram_truncated_to_limit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = local_config();
        config.max_packet_size = 100;
        let handle = start_listener(ListenerKind::SnmpTrap, &config, Arc::new(ChannelHandler { tx }))
            .await
            .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[0xabu8; 150], handle.local_addr()).await.unwrap();
        let (payload, _) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(payload, vec![0xabu8; 100]);

        client.send_to(&[0xcdu8; 100], handle.local_addr()).await.unwrap();
        let (payload, _) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(payload, vec![0xcdu8; 100]);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_does_not_wait_for_in_flight_handlers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Never notified: the handler stays blocked for the whole test.
        let gate = Arc::new(Notify::new());
        let handle = start_listener(
            ListenerKind::Syslog,
            &local_config(),
            Arc::new(GatedHandler { tx, gate: Arc::clone(&gate) }),
        )
        .await
        .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"stuck", handle.local_addr()).await.unwrap();
        let received = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(received, b"stuck");

        assert!(timeout(Duration::from_secs(2), handle.stop()).await.is_ok());
    }
}

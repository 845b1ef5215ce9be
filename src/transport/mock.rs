//! Scripted connector for unit tests.
//!
//! Each accepted connection hands a [`MockServer`] to the test, which then
//! plays the server side of the handshake and session frame by frame.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{EnginePacket, OpenPayload, SocketPacket, SocketPacketKind};

use super::backoff::Backoff;
use super::connector::{ConnectRequest, Connector, Transport};
use super::socket::SocketConfig;

/// How long test helpers wait before giving up.
const WAIT: Duration = Duration::from_secs(2);

/// What the connector does on a connect call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Plan {
    /// Hand out a transport and a server end.
    Accept,
    /// Fail immediately.
    Refuse,
    /// Never complete.
    Hang,
}

pub(crate) struct MockConnector {
    plans: Mutex<VecDeque<Plan>>,
    fallback: Plan,
    calls: AtomicUsize,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    /// Creates a connector that follows `fallback` once queued plans run out.
    pub(crate) fn new(fallback: Plan) -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, servers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            plans: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            servers,
        });
        (connector, servers_rx)
    }

    /// Queues a plan for the next connect call.
    pub(crate) fn push_plan(&self, plan: Plan) {
        self.plans.lock().push_back(plan);
    }

    /// Number of connect calls so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Transport>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.lock().pop_front().unwrap_or(self.fallback);

        match plan {
            Plan::Refuse => Err(Error::connection("connection refused")),
            Plan::Hang => std::future::pending::<Result<Box<dyn Transport>>>().await,
            Plan::Accept => {
                let (to_client, client_rx) = mpsc::unbounded_channel();
                let (to_server, server_rx) = mpsc::unbounded_channel();
                let _ = self.servers.send(MockServer {
                    request: request.clone(),
                    tx: to_client,
                    rx: server_rx,
                });
                Ok(Box::new(ChannelTransport {
                    rx: client_rx,
                    tx: to_server,
                }))
            }
        }
    }
}

struct ChannelTransport {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.tx.send(frame).map_err(|_| Error::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        Ok(())
    }
}

/// Server end of one mock connection. Dropping it closes the transport.
pub(crate) struct MockServer {
    pub(crate) request: ConnectRequest,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MockServer {
    pub(crate) fn send(&self, frame: impl Into<String>) {
        let _ = self.tx.send(frame.into());
    }

    /// Next frame from the client, or `None` after [`WAIT`].
    pub(crate) async fn recv(&mut self) -> Option<String> {
        timeout(WAIT, self.rx.recv()).await.ok().flatten()
    }

    /// Sends the Engine.IO open packet.
    pub(crate) fn open(&self, ping_interval: u64, ping_timeout: u64) {
        let open = EnginePacket::Open(OpenPayload {
            sid: "mock-eio".to_owned(),
            upgrades: Vec::new(),
            ping_interval,
            ping_timeout,
            max_payload: None,
        });
        self.send(open.encode());
    }

    /// Completes the handshake and returns the client's auth payload.
    pub(crate) async fn accept(&mut self) -> Value {
        self.accept_with(25_000, 20_000).await
    }

    pub(crate) async fn accept_with(&mut self, ping_interval: u64, ping_timeout: u64) -> Value {
        self.open(ping_interval, ping_timeout);
        let frame = self.recv().await.expect("connect packet from client");
        let body = frame.strip_prefix('4').expect("Engine.IO message frame");
        let packet = SocketPacket::decode(body).expect("valid Socket.IO packet");
        assert_eq!(packet.kind, SocketPacketKind::Connect);
        self.send(r#"40{"sid":"mock-sid"}"#);
        packet.data.unwrap_or_default()
    }

    pub(crate) fn push_event(&self, name: &str, payload: Value) {
        self.send(SocketPacket::event(name, payload).to_frame());
    }

    /// Skips frames until the client sends an event.
    pub(crate) async fn expect_event(&mut self) -> Option<(String, Value)> {
        loop {
            let frame = self.recv().await?;
            if let Some(body) = frame.strip_prefix('4')
                && let Ok(packet) = SocketPacket::decode(body)
                && let Some(parts) = packet.event_parts()
            {
                return Some(parts);
            }
        }
    }
}

/// Polls `condition` until it holds or [`WAIT`] elapses.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < WAIT {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Socket settings with short delays for tests.
pub(crate) fn test_config(token: &str) -> SocketConfig {
    SocketConfig {
        endpoint: Url::parse("ws://mock.invalid/socket.io/?EIO=4&transport=websocket")
            .expect("valid test URL"),
        token: token.to_owned(),
        with_credentials: true,
        reconnection: true,
        max_reconnect_attempts: 10,
        backoff: Backoff::new(Duration::from_millis(5), Duration::from_millis(20)),
        timeout: WAIT,
    }
}

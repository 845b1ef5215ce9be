//! Socket handle and its connection task.
//!
//! A [`Socket`] is the transport handle: one logical Socket.IO connection
//! that survives transport failures by reconnecting on its own.
//!
//! # Task Loop
//!
//! ```text
//!            ┌──────────────┐  ok   ┌───────────┐
//!  start ───►│  Connecting  │──────►│ Connected │
//!            └──────────────┘       └───────────┘
//!               ▲    │ fail            │  41 from server ──► Connecting (now)
//!               │    ▼                 │  lost / ping timeout
//!            ┌──────────────┐◄─────────┘
//!            │ Disconnected │── backoff ──► Connecting
//!            └──────────────┘── exhausted ──► idle until reconnect()/close()
//! ```
//!
//! Listeners run on the task, outside every internal lock.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ListenerId;
use crate::protocol::packet::DEFAULT_NAMESPACE;
use crate::protocol::{
    EnginePacket, OpenPayload, SocketPacket, SocketPacketKind, is_lifecycle, names,
};

use super::backoff::Backoff;
use super::connector::{ConnectRequest, Connector, Transport};
use super::listeners::{Listener, ListenerTable};

// ============================================================================
// Constants
// ============================================================================

/// Disconnect reason when the server sends a namespace disconnect.
pub const SERVER_DISCONNECT_REASON: &str = "io server disconnect";

/// Disconnect reason when [`Socket::close`] ends the session.
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// Disconnect reason when the transport closes underneath the session.
pub const TRANSPORT_CLOSE_REASON: &str = "transport close";

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection state of a socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No live transport.
    #[default]
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// Handshake completed; events flow.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

// ============================================================================
// SocketConfig
// ============================================================================

/// Settings for one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Realtime endpoint.
    pub endpoint: Url,
    /// Bearer token sent in the connect packet.
    pub token: String,
    /// Also send the token as an `Authorization` header.
    pub with_credentials: bool,
    /// Reconnect automatically after failures.
    pub reconnection: bool,
    /// Consecutive failed attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay policy between attempts.
    pub backoff: Backoff,
    /// Bound on one attempt, handshake included.
    pub timeout: Duration,
}

impl SocketConfig {
    fn request(&self) -> ConnectRequest {
        ConnectRequest {
            url: self.endpoint.clone(),
            token: self.token.clone(),
            with_credentials: self.with_credentials,
        }
    }
}

// ============================================================================
// Internal Types
// ============================================================================

/// Commands from the handle to the task.
enum SocketCommand {
    /// Write an encoded frame.
    Emit(String),
    /// Retry now, optionally with a new token.
    Reconnect { token: Option<String> },
    /// End the session and stop the task.
    Close,
}

/// How a connected session ended.
enum SessionEnd {
    ClientClose,
    ServerDisconnect,
    Lost(String),
}

/// Outcome of waiting between attempts.
enum Wake {
    Retry,
    Stop,
}

/// A transport that completed the Socket.IO handshake.
struct Session {
    transport: Box<dyn Transport>,
    open: OpenPayload,
    sid: Option<String>,
}

struct SocketInner {
    state: Mutex<ConnectionState>,
    listeners: Mutex<ListenerTable>,
    /// Consecutive failed attempts.
    attempts: AtomicU32,
    /// Set while the task sleeps between failed attempts.
    backing_off: AtomicBool,
    closed: AtomicBool,
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Taken by `start`.
    pending: Mutex<Option<(SocketConfig, mpsc::UnboundedReceiver<SocketCommand>)>>,
}

impl SocketInner {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        if self.closed.load(Ordering::Acquire) && state != ConnectionState::Disconnected {
            return;
        }
        *self.state.lock() = state;
    }

    fn dispatch(&self, event: &str, payload: &Value) {
        let listeners = self.listeners.lock().snapshot(event);
        trace!(event, count = listeners.len(), "Dispatching event");
        for listener in listeners {
            listener(payload);
        }
    }
}

// ============================================================================
// Socket
// ============================================================================

/// Handle to one realtime connection.
///
/// Cloning yields another handle to the same connection. The task keeps
/// running until [`Socket::close`] is called.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.state())
            .field("attempts", &self.reconnect_attempts())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

impl Socket {
    /// Creates a socket in the `Connecting` state without starting it.
    ///
    /// Register listeners, then call [`Socket::start`], so that no lifecycle
    /// event can fire before they are in place.
    #[must_use]
    pub fn new(config: SocketConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(SocketInner {
                state: Mutex::new(ConnectionState::Connecting),
                listeners: Mutex::new(ListenerTable::default()),
                attempts: AtomicU32::new(0),
                backing_off: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                command_tx,
                pending: Mutex::new(Some((config, command_rx))),
            }),
        }
    }

    /// Spawns the connection task. Calling it twice has no effect.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self, connector: Arc<dyn Connector>) {
        let Some((config, command_rx)) = self.inner.pending.lock().take() else {
            warn!("Socket already started");
            return;
        };
        tokio::spawn(run(connector, config, Arc::clone(&self.inner), command_rx));
    }

    /// Current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Returns `true` once the handshake has completed and until the session ends.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Consecutive failed connection attempts.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Registers a listener for `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.add_listener(event, id, Arc::new(handler));
        id
    }

    /// Registers an already boxed listener under a caller-chosen id.
    pub fn add_listener(&self, event: &str, id: ListenerId, listener: Listener) {
        self.inner.listeners.lock().insert(event, id, listener);
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(event, id)
    }

    /// Sends a named event if connected.
    ///
    /// Returns `false`, without queuing, when not connected or when `event`
    /// is a reserved lifecycle name.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        if is_lifecycle(event) {
            warn!(event, "Refusing to emit reserved lifecycle event");
            return false;
        }
        if !self.is_connected() {
            trace!(event, "Not connected, dropping event");
            return false;
        }
        let frame = SocketPacket::event(event, payload).to_frame();
        self.inner.command_tx.send(SocketCommand::Emit(frame)).is_ok()
    }

    /// Restarts connection attempts on a disconnected socket.
    ///
    /// Resets the attempt counter and skips the delay after a lost session.
    /// A new token, if given, replaces the old one. No effect unless the
    /// socket is `Disconnected` and not closed, or while automatic
    /// reconnection is waiting out a backoff delay after a failed attempt.
    pub fn reconnect(&self, token: Option<String>) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if *state != ConnectionState::Disconnected {
                return;
            }
            if self.inner.backing_off.load(Ordering::Acquire) {
                debug!("Automatic reconnection pending, ignoring reconnect");
                return;
            }
            *state = ConnectionState::Connecting;
        }
        self.inner.attempts.store(0, Ordering::SeqCst);

        if self
            .inner
            .command_tx
            .send(SocketCommand::Reconnect { token })
            .is_err()
        {
            warn!("Socket task has exited, cannot reconnect");
        }
    }

    /// Closes the connection and stops the task. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.set_state(ConnectionState::Disconnected);
        let _ = self.inner.command_tx.send(SocketCommand::Close);
    }

    /// Returns a handle that does not keep the socket alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakSocket {
        WeakSocket {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

// ============================================================================
// WeakSocket
// ============================================================================

/// Non-owning socket handle, for listeners that need to emit.
#[derive(Clone)]
pub struct WeakSocket {
    inner: Weak<SocketInner>,
}

impl WeakSocket {
    /// Upgrades to a [`Socket`] if it still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<Socket> {
        self.inner.upgrade().map(|inner| Socket { inner })
    }
}

// ============================================================================
// Task
// ============================================================================

/// Connect → handshake → session → reconnect, until closed.
async fn run(
    connector: Arc<dyn Connector>,
    mut config: SocketConfig,
    inner: Arc<SocketInner>,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
) {
    // True once any attempt has failed or a session has ended.
    let mut reconnecting = false;

    loop {
        if inner.closed.load(Ordering::Acquire) {
            break;
        }

        inner.set_state(ConnectionState::Connecting);
        inner.backing_off.store(false, Ordering::Release);
        let attempt = inner.attempts.load(Ordering::SeqCst) + 1;
        if reconnecting {
            inner.dispatch(names::RECONNECT_ATTEMPT, &json!(attempt));
        }
        debug!(url = %config.endpoint, attempt, "Opening realtime connection");

        let outcome = {
            let request = config.request();
            let attempt_fut = timeout(config.timeout, establish(connector.as_ref(), &request));
            tokio::pin!(attempt_fut);

            loop {
                tokio::select! {
                    result = &mut attempt_fut => break Some(result),
                    command = command_rx.recv() => match command {
                        Some(SocketCommand::Close) | None => break None,
                        Some(SocketCommand::Reconnect { token }) => {
                            if let Some(token) = token {
                                config.token = token;
                            }
                        }
                        Some(SocketCommand::Emit(_)) => {
                            trace!("Dropping frame while connecting");
                        }
                    },
                }
            }
        };

        let Some(result) = outcome else {
            break;
        };
        let result = result.unwrap_or_else(|_| {
            Err(Error::connection_timeout(config.timeout.as_millis() as u64))
        });

        let wake = match result {
            Ok(session) => {
                let failures = inner.attempts.swap(0, Ordering::SeqCst);
                inner.set_state(ConnectionState::Connected);
                debug!(sid = ?session.sid, "Realtime connection established");

                inner.dispatch(names::CONNECT, &Value::Null);
                if reconnecting {
                    inner.dispatch(names::RECONNECT, &json!(failures + 1));
                }
                reconnecting = true;

                let end = drive(session, &inner, &mut command_rx, &mut config).await;
                inner.set_state(ConnectionState::Disconnected);

                match end {
                    SessionEnd::ClientClose => {
                        inner.dispatch(names::DISCONNECT, &json!(CLIENT_DISCONNECT_REASON));
                        break;
                    }
                    SessionEnd::ServerDisconnect => {
                        inner.dispatch(names::DISCONNECT, &json!(SERVER_DISCONNECT_REASON));
                        Wake::Retry
                    }
                    SessionEnd::Lost(reason) => {
                        inner.dispatch(names::DISCONNECT, &json!(reason));
                        let delay = config.reconnection.then(|| config.backoff.delay(1));
                        wait(delay, &mut command_rx, &mut config).await
                    }
                }
            }
            Err(e) => {
                let failures = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let retry = config.reconnection
                    && e.is_recoverable()
                    && failures < config.max_reconnect_attempts;
                // Published before the state so `reconnect` never sees one without the other.
                inner.backing_off.store(retry, Ordering::Release);
                inner.set_state(ConnectionState::Disconnected);
                debug!(attempt = failures, error = %e, retry, "Connection attempt failed");

                let message = json!(e.to_string());
                inner.dispatch(names::CONNECT_ERROR, &message);
                if reconnecting {
                    inner.dispatch(names::RECONNECT_ERROR, &message);
                }
                reconnecting = true;

                if retry {
                    let delay = config.backoff.delay(failures);
                    wait(Some(delay), &mut command_rx, &mut config).await
                } else {
                    if !e.is_recoverable() {
                        warn!(error = %e, "Connection refused permanently, not retrying");
                    }
                    inner.dispatch(names::RECONNECT_FAILED, &json!(failures));
                    wait(None, &mut command_rx, &mut config).await
                }
            }
        };

        if let Wake::Stop = wake {
            break;
        }
    }

    inner.set_state(ConnectionState::Disconnected);
    debug!("Socket task terminated");
}

/// Opens a transport and completes the Engine.IO and Socket.IO handshakes.
async fn establish(connector: &dyn Connector, request: &ConnectRequest) -> Result<Session> {
    let mut transport = connector.connect(request).await?;

    let open = match next_packet(transport.as_mut()).await? {
        EnginePacket::Open(open) => open,
        other => {
            return Err(Error::protocol(format!(
                "expected open packet, got {other:?}"
            )));
        }
    };
    trace!(
        sid = %open.sid,
        ping_interval = open.ping_interval,
        ping_timeout = open.ping_timeout,
        "Engine.IO open"
    );

    let connect = SocketPacket::connect(json!({ "token": request.token }));
    transport.send(connect.to_frame()).await?;

    loop {
        match next_packet(transport.as_mut()).await? {
            EnginePacket::Ping => transport.send(EnginePacket::Pong.encode()).await?,
            EnginePacket::Message(body) => {
                let packet = SocketPacket::decode(&body)?;
                match packet.kind {
                    SocketPacketKind::Connect => {
                        let sid = packet
                            .data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .map(str::to_owned);
                        return Ok(Session {
                            transport,
                            open,
                            sid,
                        });
                    }
                    SocketPacketKind::ConnectError => {
                        let message = packet
                            .data
                            .as_ref()
                            .map(|d| {
                                d.get("message")
                                    .and_then(Value::as_str)
                                    .map_or_else(|| d.to_string(), str::to_owned)
                            })
                            .unwrap_or_else(|| "connection refused".to_owned());
                        return Err(Error::auth_rejected(message));
                    }
                    other => trace!(kind = ?other, "Ignoring packet before connect ack"),
                }
            }
            EnginePacket::Close => return Err(Error::ConnectionClosed),
            other => trace!(packet = ?other, "Ignoring packet during handshake"),
        }
    }
}

async fn next_packet(transport: &mut dyn Transport) -> Result<EnginePacket> {
    match transport.recv().await {
        Some(Ok(frame)) => EnginePacket::decode(&frame),
        Some(Err(e)) => Err(e),
        None => Err(Error::ConnectionClosed),
    }
}

/// Pumps a connected session until it ends.
async fn drive(
    session: Session,
    inner: &SocketInner,
    command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    config: &mut SocketConfig,
) -> SessionEnd {
    let Session {
        mut transport,
        open,
        ..
    } = session;

    // The server pings every `ping_interval`; silence past the grace period is fatal.
    let heartbeat = Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout));
    let deadline = sleep(heartbeat);
    tokio::pin!(deadline);

    let end = loop {
        tokio::select! {
            incoming = transport.recv() => match incoming {
                Some(Ok(frame)) => {
                    deadline.as_mut().reset(Instant::now() + heartbeat);
                    if let Some(end) = handle_frame(&frame, transport.as_mut(), inner).await {
                        break end;
                    }
                }
                Some(Err(e)) => break SessionEnd::Lost(format!("transport error: {e}")),
                None => break SessionEnd::Lost(TRANSPORT_CLOSE_REASON.to_owned()),
            },

            command = command_rx.recv() => match command {
                Some(SocketCommand::Emit(frame)) => {
                    if let Err(e) = transport.send(frame).await {
                        break SessionEnd::Lost(format!("transport error: {e}"));
                    }
                }
                Some(SocketCommand::Reconnect { token }) => {
                    if let Some(token) = token {
                        config.token = token;
                    }
                }
                Some(SocketCommand::Close) | None => {
                    let _ = transport.send(SocketPacket::disconnect().to_frame()).await;
                    break SessionEnd::ClientClose;
                }
            },

            () = &mut deadline => {
                let timeout_ms = heartbeat.as_millis() as u64;
                break SessionEnd::Lost(Error::ping_timeout(timeout_ms).to_string());
            }
        }
    };

    if let Err(e) = transport.close().await {
        trace!(error = %e, "Transport close failed");
    }
    end
}

/// Handles one inbound frame. Returns `Some` when the session must end.
async fn handle_frame(
    frame: &str,
    transport: &mut dyn Transport,
    inner: &SocketInner,
) -> Option<SessionEnd> {
    let packet = match EnginePacket::decode(frame) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(error = %e, "Skipping malformed frame");
            return None;
        }
    };

    match packet {
        EnginePacket::Ping => {
            if let Err(e) = transport.send(EnginePacket::Pong.encode()).await {
                return Some(SessionEnd::Lost(format!("transport error: {e}")));
            }
        }
        EnginePacket::Message(body) => match SocketPacket::decode(&body) {
            Ok(packet) if packet.namespace != DEFAULT_NAMESPACE => {
                trace!(namespace = %packet.namespace, "Ignoring packet for other namespace");
            }
            Ok(packet) => match packet.kind {
                SocketPacketKind::Event => match packet.event_parts() {
                    Some((name, _)) if is_lifecycle(&name) => {
                        warn!(event = %name, "Server sent a reserved event name, ignoring");
                    }
                    Some((name, payload)) => inner.dispatch(&name, &payload),
                    None => warn!("Event packet without a name"),
                },
                SocketPacketKind::Disconnect => return Some(SessionEnd::ServerDisconnect),
                other => trace!(kind = ?other, "Ignoring packet"),
            },
            Err(e) => warn!(error = %e, "Skipping malformed packet"),
        },
        EnginePacket::Close => return Some(SessionEnd::Lost(TRANSPORT_CLOSE_REASON.to_owned())),
        other => trace!(packet = ?other, "Ignoring Engine.IO packet"),
    }
    None
}

/// Waits `delay` (forever if `None`) while serving commands.
async fn wait(
    delay: Option<Duration>,
    command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    config: &mut SocketConfig,
) -> Wake {
    if let Some(delay) = delay {
        trace!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
    }
    let sleeper = async {
        match delay {
            Some(delay) => sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(sleeper);

    loop {
        tokio::select! {
            () = &mut sleeper => return Wake::Retry,
            command = command_rx.recv() => match command {
                Some(SocketCommand::Reconnect { token }) => {
                    if let Some(token) = token {
                        config.token = token;
                    }
                    return Wake::Retry;
                }
                Some(SocketCommand::Emit(_)) => trace!("Dropping frame while disconnected"),
                Some(SocketCommand::Close) | None => return Wake::Stop,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use crate::transport::mock::{MockConnector, Plan, test_config, wait_until};

    fn recorder(socket: &Socket, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        socket.on(event, move |payload: &Value| sink.lock().push(payload.clone()));
        seen
    }

    #[tokio::test]
    async fn test_handshake_sends_token_and_dispatches_events() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let socket = Socket::new(test_config("tok-1"));
        let messages = recorder(&socket, names::NEW_MESSAGE);
        let connects = recorder(&socket, names::CONNECT);
        socket.start(connector.clone());

        let mut server = servers.recv().await.unwrap();
        let auth = server.accept().await;
        assert_eq!(auth, json!({ "token": "tok-1" }));
        assert!(wait_until(|| socket.is_connected()).await);
        assert_eq!(connects.lock().len(), 1);

        server.push_event(names::NEW_MESSAGE, json!({ "sessionId": "s1", "chatId": "c1" }));
        assert!(wait_until(|| messages.lock().len() == 1).await);
        assert_eq!(messages.lock()[0]["chatId"], "c1");

        socket.close();
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let socket = Socket::new(test_config("tok"));
        socket.start(connector);

        let mut server = servers.recv().await.unwrap();
        server.accept().await;
        server.send("2");
        assert_eq!(server.recv().await.as_deref(), Some("3"));

        socket.close();
    }

    #[tokio::test]
    async fn test_emit_only_while_connected() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let socket = Socket::new(test_config("tok"));
        assert!(!socket.emit("join_session", json!("s1")));
        socket.start(connector);

        let mut server = servers.recv().await.unwrap();
        server.accept().await;
        assert!(wait_until(|| socket.is_connected()).await);

        assert!(socket.emit("join_session", json!("s1")));
        assert_eq!(
            server.expect_event().await,
            Some(("join_session".to_owned(), json!("s1")))
        );
        assert!(!socket.emit(names::CONNECT, Value::Null));

        socket.close();
    }

    #[tokio::test]
    async fn test_server_disconnect_reconnects_without_backoff() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let mut config = test_config("tok");
        config.backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(30));
        let socket = Socket::new(config);
        let disconnects = recorder(&socket, names::DISCONNECT);
        let reconnects = recorder(&socket, names::RECONNECT);
        socket.start(connector.clone());

        let mut server = servers.recv().await.unwrap();
        server.accept().await;
        assert!(wait_until(|| socket.is_connected()).await);

        server.send("41");
        let mut second = servers.recv().await.unwrap();
        second.accept().await;
        assert!(wait_until(|| reconnects.lock().len() == 1).await);

        assert_eq!(connector.calls(), 2);
        assert_eq!(disconnects.lock()[0], json!(SERVER_DISCONNECT_REASON));
        assert!(socket.is_connected());

        socket.close();
    }

    #[tokio::test]
    async fn test_lost_transport_backs_off_and_reconnects() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let socket = Socket::new(test_config("tok"));
        let disconnects = recorder(&socket, names::DISCONNECT);
        let attempts = recorder(&socket, names::RECONNECT_ATTEMPT);
        let reconnects = recorder(&socket, names::RECONNECT);
        socket.start(connector.clone());

        let mut server = servers.recv().await.unwrap();
        server.accept().await;
        assert!(wait_until(|| socket.is_connected()).await);
        assert!(attempts.lock().is_empty());
        drop(server);

        let mut second = servers.recv().await.unwrap();
        second.accept().await;
        assert!(wait_until(|| socket.is_connected()).await);
        assert_eq!(disconnects.lock()[0], json!(TRANSPORT_CLOSE_REASON));
        assert_eq!(*attempts.lock(), vec![json!(1)]);
        assert!(wait_until(|| reconnects.lock().len() == 1).await);
        assert_eq!(reconnects.lock()[0], json!(1));
        assert_eq!(connector.calls(), 2);

        socket.close();
    }

    #[tokio::test]
    async fn test_exhausted_attempts_stop_until_reconnect() {
        let (connector, _servers) = MockConnector::new(Plan::Refuse);
        let mut config = test_config("tok");
        config.max_reconnect_attempts = 3;
        let socket = Socket::new(config);
        let failed = recorder(&socket, names::RECONNECT_FAILED);
        let errors = recorder(&socket, names::CONNECT_ERROR);
        socket.start(connector.clone());

        assert!(wait_until(|| failed.lock().len() == 1).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.calls(), 3);
        assert_eq!(errors.lock().len(), 3);
        assert_eq!(socket.state(), ConnectionState::Disconnected);
        assert_eq!(socket.reconnect_attempts(), 3);

        socket.reconnect(None);
        assert!(wait_until(|| failed.lock().len() == 2).await);
        assert_eq!(connector.calls(), 6);

        socket.close();
    }

    #[tokio::test]
    async fn test_reconnect_during_backoff_keeps_attempts_bounded() {
        let (connector, _servers) = MockConnector::new(Plan::Refuse);
        let mut config = test_config("tok");
        config.max_reconnect_attempts = 3;
        config.backoff = Backoff::new(Duration::from_millis(200), Duration::from_millis(200));
        let socket = Socket::new(config);
        let failed = recorder(&socket, names::RECONNECT_FAILED);
        socket.start(connector.clone());
        assert!(wait_until(|| connector.calls() == 1).await);

        // Attempts at ~0ms, ~200ms and ~400ms; hammer reconnect in between.
        let start = tokio::time::Instant::now();
        while start.elapsed() < Duration::from_millis(300) {
            socket.reconnect(Some("tok".to_owned()));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(connector.calls(), 2);
        assert_eq!(socket.reconnect_attempts(), 2);

        assert!(wait_until(|| failed.lock().len() == 1).await);
        assert_eq!(connector.calls(), 3);
        assert_eq!(socket.reconnect_attempts(), 3);

        // Idle after exhaustion, so reconnect is honored again.
        socket.reconnect(None);
        assert!(wait_until(|| connector.calls() == 4).await);

        socket.close();
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_retried() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let mut config = test_config("revoked");
        config.max_reconnect_attempts = 3;
        let socket = Socket::new(config);
        let errors = recorder(&socket, names::CONNECT_ERROR);
        let failed = recorder(&socket, names::RECONNECT_FAILED);
        socket.start(connector.clone());

        let mut server = servers.recv().await.unwrap();
        server.open(25_000, 20_000);
        assert!(server.recv().await.is_some());
        server.send(r#"44{"message":"invalid token"}"#);

        assert!(wait_until(|| failed.lock().len() == 1).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.calls(), 1);
        assert_eq!(errors.lock().len(), 1);
        assert_eq!(failed.lock()[0], json!(1));
        assert_eq!(socket.state(), ConnectionState::Disconnected);

        socket.reconnect(Some("fresh".to_owned()));
        let mut second = servers.recv().await.unwrap();
        assert_eq!(second.accept().await, json!({ "token": "fresh" }));
        assert!(wait_until(|| socket.is_connected()).await);

        socket.close();
    }

    #[tokio::test]
    async fn test_reconnect_with_new_token() {
        let (connector, mut servers) = MockConnector::new(Plan::Refuse);
        let mut config = test_config("expired");
        config.max_reconnect_attempts = 1;
        let socket = Socket::new(config);
        let failed = recorder(&socket, names::RECONNECT_FAILED);
        socket.start(connector.clone());
        assert!(wait_until(|| failed.lock().len() == 1).await);

        connector.push_plan(Plan::Accept);
        socket.reconnect(Some("fresh".to_owned()));
        let mut server = servers.recv().await.unwrap();
        assert_eq!(server.accept().await, json!({ "token": "fresh" }));
        assert!(wait_until(|| socket.is_connected()).await);

        socket.close();
    }

    #[tokio::test]
    async fn test_close_sends_disconnect_and_stops() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let socket = Socket::new(test_config("tok"));
        let disconnects = recorder(&socket, names::DISCONNECT);
        socket.start(connector.clone());

        let mut server = servers.recv().await.unwrap();
        server.accept().await;
        assert!(wait_until(|| socket.is_connected()).await);

        socket.close();
        assert_eq!(socket.state(), ConnectionState::Disconnected);
        assert_eq!(server.recv().await.as_deref(), Some("41"));
        assert!(wait_until(|| disconnects.lock().len() == 1).await);
        assert_eq!(disconnects.lock()[0], json!(CLIENT_DISCONNECT_REASON));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.calls(), 1);
        socket.reconnect(None);
        assert_eq!(socket.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_missing_pings_end_the_session() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let socket = Socket::new(test_config("tok"));
        let disconnects = recorder(&socket, names::DISCONNECT);
        socket.start(connector);

        let mut server = servers.recv().await.unwrap();
        server.accept_with(20, 20).await;
        assert!(wait_until(|| disconnects.lock().len() == 1).await);
        let reason = disconnects.lock()[0].as_str().unwrap_or_default().to_owned();
        assert!(reason.starts_with("Ping timeout"), "{reason}");

        socket.close();
    }

    #[tokio::test]
    async fn test_connect_error_packet_is_reported() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let mut config = test_config("bad");
        config.reconnection = false;
        let socket = Socket::new(config);
        let errors = recorder(&socket, names::CONNECT_ERROR);
        socket.start(connector.clone());

        let mut server = servers.recv().await.unwrap();
        server.open(25_000, 20_000);
        assert!(server.recv().await.is_some());
        server.send(r#"44{"message":"invalid token"}"#);

        assert!(wait_until(|| errors.lock().len() == 1).await);
        assert_eq!(
            errors.lock()[0],
            json!("Connection rejected by server: invalid token")
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.calls(), 1);

        socket.close();
    }

    #[tokio::test]
    async fn test_listener_can_call_back_into_socket() {
        let (connector, mut servers) = MockConnector::new(Plan::Accept);
        let socket = Socket::new(test_config("tok"));
        let weak = socket.downgrade();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        socket.on(names::CONNECT, move |_: &Value| {
            if let Some(socket) = weak.upgrade() {
                socket.emit("hello", json!(1));
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        socket.start(connector);

        let mut server = servers.recv().await.unwrap();
        server.accept().await;
        assert_eq!(
            server.expect_event().await,
            Some(("hello".to_owned(), json!(1)))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        socket.close();
    }
}

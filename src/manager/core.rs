//! Connection manager.
//!
//! Owns the single transport handle for the console's realtime channel and
//! exposes a small pub/sub and room surface to the rest of the application.
//!
//! Nothing here returns errors. Connection problems are logged and reported
//! through lifecycle events. Callers that need liveness poll
//! [`ConnectionManager::is_connected`] or subscribe to `disconnect`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::Result;
use crate::identifiers::{ListenerId, SessionId};
use crate::protocol::names;
use crate::transport::{ConnectionState, Connector, Listener, Socket, WsConnector};

use super::builder::ConnectionManagerBuilder;
use super::options::ConnectionOptions;

// ============================================================================
// Types
// ============================================================================

/// Listener registered while no socket existed.
struct EarlyListener {
    event: String,
    id: ListenerId,
    listener: Listener,
}

/// The single ownership slot.
#[derive(Default)]
struct Slot {
    socket: Option<Socket>,
    early: Vec<EarlyListener>,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Manages one logical realtime connection to the messaging backend.
///
/// Share it across the application with `Arc<ConnectionManager>`. All
/// methods are synchronous and return immediately; network work happens on
/// a background task, so a tokio runtime must be running when
/// [`connect`](Self::connect) is called.
///
/// # Example
///
/// ```no_run
/// use realtime_link::ConnectionManager;
///
/// # async fn example() -> realtime_link::Result<()> {
/// let manager = ConnectionManager::builder()
///     .url("https://api.console.example")
///     .build()?;
///
/// manager.on("new_message", |payload| println!("message: {payload}"));
/// manager.connect("bearer-token");
///
/// // Later, once connected:
/// manager.join_session("session-42");
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager {
    options: ConnectionOptions,
    endpoint: Url,
    connector: Arc<dyn Connector>,
    slot: Mutex<Slot>,
    /// Joined session rooms, kept for replay after reconnects.
    rooms: Arc<Mutex<FxHashSet<SessionId>>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Constructors
// ============================================================================

impl ConnectionManager {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new()
    }

    /// Creates a manager using the WebSocket connector.
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) or [`Error::Url`](crate::Error::Url)
    /// if the options are invalid.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        Self::with_connector(options, Arc::new(WsConnector))
    }

    /// Creates a manager that opens transports through `connector`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) or [`Error::Url`](crate::Error::Url)
    /// if the options are invalid.
    pub fn with_connector(options: ConnectionOptions, connector: Arc<dyn Connector>) -> Result<Self> {
        let endpoint = options.endpoint()?;
        debug!(endpoint = %endpoint, "Connection manager created");

        Ok(Self {
            options,
            endpoint,
            connector,
            slot: Mutex::new(Slot::default()),
            rooms: Arc::new(Mutex::new(FxHashSet::default())),
        })
    }

    /// Options this manager was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Resolved realtime endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Starts connecting with `token`. Returns immediately.
    ///
    /// - Already connected or connecting: no effect.
    /// - Socket exists but is disconnected: the socket reconnects itself with
    ///   `token`, and its attempt counter resets. While automatic
    ///   reconnection is waiting out a backoff delay this is a no-op, so
    ///   repeated calls cannot bypass the attempt bound.
    /// - No socket: a new one is created and started.
    ///
    /// An empty token is ignored with a warning.
    pub fn connect(&self, token: &str) {
        if token.is_empty() {
            warn!("connect called with an empty token, ignoring");
            return;
        }

        let mut guard = self.slot.lock();
        let slot = &mut *guard;

        if let Some(ref socket) = slot.socket {
            match socket.state() {
                ConnectionState::Connected | ConnectionState::Connecting => {
                    debug!(state = %socket.state(), "Already connected or connecting");
                }
                ConnectionState::Disconnected => {
                    debug!("Reusing disconnected socket");
                    socket.reconnect(Some(token.to_owned()));
                }
            }
            return;
        }

        let socket = Socket::new(self.options.socket_config(&self.endpoint, token));
        Self::install_lifecycle_logging(&socket);
        if self.options.rejoin_sessions {
            self.install_rejoin(&socket);
        }

        let early = std::mem::take(&mut slot.early);
        if !early.is_empty() {
            debug!(count = early.len(), "Installing listeners registered before connect");
        }
        for entry in early {
            socket.add_listener(&entry.event, entry.id, entry.listener);
        }

        socket.start(Arc::clone(&self.connector));
        info!(endpoint = %self.endpoint, "Realtime connection starting");
        slot.socket = Some(socket);
    }

    /// Closes the connection and releases the socket. Idempotent.
    ///
    /// Listeners registered on the released socket are dropped with it.
    pub fn disconnect(&self) {
        let socket = self.slot.lock().socket.take();
        self.rooms.lock().clear();

        if let Some(socket) = socket {
            socket.close();
            info!("Realtime connection closed");
        }
    }

    /// Returns `true` while the socket is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connection state; `Disconnected` when there is no socket.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.slot
            .lock()
            .socket
            .as_ref()
            .map_or(ConnectionState::Disconnected, Socket::state)
    }

    /// Consecutive failed connection attempts of the current socket.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.slot
            .lock()
            .socket
            .as_ref()
            .map_or(0, Socket::reconnect_attempts)
    }

    fn install_lifecycle_logging(socket: &Socket) {
        socket.on(names::CONNECT, |_: &Value| info!("Realtime connected"));
        socket.on(names::DISCONNECT, |reason: &Value| {
            warn!(%reason, "Realtime disconnected");
        });
        socket.on(names::CONNECT_ERROR, |err: &Value| {
            error!(error = %err, "Realtime connection error");
        });
        socket.on(names::RECONNECT, |attempt: &Value| {
            info!(%attempt, "Realtime reconnected");
        });
        socket.on(names::RECONNECT_ERROR, |err: &Value| {
            warn!(error = %err, "Realtime reconnection failed");
        });
        socket.on(names::RECONNECT_FAILED, |attempts: &Value| {
            error!(%attempts, "Realtime reconnection stopped");
        });
    }

    fn install_rejoin(&self, socket: &Socket) {
        let weak = socket.downgrade();
        let rooms = Arc::clone(&self.rooms);

        socket.on(names::RECONNECT, move |_: &Value| {
            let Some(socket) = weak.upgrade() else {
                return;
            };
            let ids: Vec<SessionId> = rooms.lock().iter().cloned().collect();
            for id in &ids {
                socket.emit(names::JOIN_SESSION, json!(id.as_str()));
            }
            if !ids.is_empty() {
                debug!(count = ids.len(), "Re-joined session rooms");
            }
        });
    }
}

// ============================================================================
// ConnectionManager - Rooms
// ============================================================================

impl ConnectionManager {
    /// Asks the server to push events for `session_id` to this connection.
    ///
    /// Returns `false` and drops the intent when not connected.
    pub fn join_session(&self, session_id: impl Into<SessionId>) -> bool {
        let session_id = session_id.into();
        let sent = self.emit(names::JOIN_SESSION, json!(session_id.as_str()));
        if sent {
            debug!(session = %session_id, "Joined session room");
            self.rooms.lock().insert(session_id);
        } else {
            debug!(session = %session_id, "Not connected, join dropped");
        }
        sent
    }

    /// Asks the server to stop pushing events for `session_id`.
    ///
    /// Returns `false` and drops the intent when not connected. The session
    /// is forgotten for reconnect replay either way.
    pub fn leave_session(&self, session_id: impl Into<SessionId>) -> bool {
        let session_id = session_id.into();
        self.rooms.lock().remove(&session_id);
        let sent = self.emit(names::LEAVE_SESSION, json!(session_id.as_str()));
        debug!(session = %session_id, sent, "Leave session");
        sent
    }
}

// ============================================================================
// ConnectionManager - Events
// ============================================================================

impl ConnectionManager {
    /// Registers `handler` for `event` and returns its id.
    ///
    /// Before the first [`connect`](Self::connect) the listener is buffered
    /// and installed on the socket when it is created, unless early
    /// buffering is disabled, in which case it is dropped.
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        let listener: Listener = Arc::new(handler);
        let mut guard = self.slot.lock();
        let slot = &mut *guard;

        match slot.socket {
            Some(ref socket) => socket.add_listener(event, id, listener),
            None if self.options.buffer_early_listeners => {
                debug!(event, %id, "No socket yet, buffering listener");
                slot.early.push(EarlyListener {
                    event: event.to_owned(),
                    id,
                    listener,
                });
            }
            None => debug!(event, %id, "No socket yet, listener dropped"),
        }
        id
    }

    /// Removes the listener `id` from `event`. Returns `true` if it was found.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        match slot.socket {
            Some(ref socket) => socket.off(event, id),
            None => {
                let before = slot.early.len();
                slot.early.retain(|e| !(e.id == id && e.event == event));
                slot.early.len() != before
            }
        }
    }

    /// Sends `event` with `payload` if connected.
    ///
    /// `payload` is always sent as one argument, so `Value::Null` arrives as
    /// `null` rather than as an event without arguments.
    ///
    /// Best effort: returns `false` and drops the event otherwise.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        self.slot
            .lock()
            .socket
            .as_ref()
            .is_some_and(|socket| socket.emit(event, payload))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(socket) = self.slot.get_mut().socket.take() {
            socket.close();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

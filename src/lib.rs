//! Realtime Link - resilient realtime channel for the messaging console.
//!
//! This library keeps one long-lived Socket.IO connection to the messaging
//! backend and exposes it as a small, non-blocking pub/sub and room API.
//!
//! # Architecture
//!
//! The client owns a single socket per manager:
//!
//! - **Manager**: Singleton-per-application handle, rooms and listeners
//! - **Socket**: Background task driving handshake, heartbeat and reconnects
//! - **Connector**: Opens the WebSocket transport with bearer credentials
//!
//! Key design principles:
//!
//! - At most one live socket per [`ConnectionManager`]
//! - All calls return immediately; failures surface as lifecycle events
//! - Emits while disconnected are dropped, never queued
//! - Reconnection is bounded and linear, capped by a maximum delay
//!
//! # Quick Start
//!
//! ```no_run
//! use realtime_link::{ConnectionManager, Event, ServerEvent, names};
//!
//! #[tokio::main]
//! async fn main() -> realtime_link::Result<()> {
//!     let manager = ConnectionManager::builder()
//!         .url("https://api.console.example")
//!         .build()?;
//!
//!     manager.on(names::NEW_MESSAGE, |payload: &serde_json::Value| {
//!         let event = Event::new(names::NEW_MESSAGE, payload.clone());
//!         if let ServerEvent::NewMessage { session_id, .. } = event.parse() {
//!             println!("new message in {session_id}");
//!         }
//!     });
//!
//!     manager.connect("bearer-token");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`manager`] | [`ConnectionManager`], builder and options |
//! | [`protocol`] | Engine.IO / Socket.IO codec and event names |
//! | [`transport`] | Socket task, connectors and reconnection policy |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// Fallible construction returns [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers keep listener ids and session ids apart.
pub mod identifiers;

/// Connection manager and configuration.
///
/// Use [`ConnectionManager::builder()`] to create a configured manager.
pub mod manager;

/// Realtime wire protocol.
pub mod protocol;

/// Realtime transport layer.
///
/// Socket task, transport seams and backoff policy.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Manager types
pub use manager::{ConnectionManager, ConnectionManagerBuilder, ConnectionOptions, TransportKind};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, SessionId};

// Protocol types
pub use protocol::{Event, ServerEvent, names};

// Transport types
pub use transport::{
    Backoff, ConnectRequest, ConnectionState, Connector, Socket, Transport, WsConnector,
};

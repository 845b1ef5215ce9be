//! Realtime transport layer.
//!
//! This module owns the live connection to the messaging backend: opening
//! transports, the Socket.IO handshake, heartbeats, listener dispatch and
//! automatic reconnection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                               ┌──────────────────┐
//! │ ConnectionManager│                               │ Messaging backend│
//! │        │         │          WebSocket            │                  │
//! │     Socket ──────┼──────────────────────────────►│  /socket.io/     │
//! │   (task loop)    │   Engine.IO / Socket.IO       │  rooms by session│
//! └──────────────────┘                               └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Socket::new` - handle in `Connecting`, listeners can be attached
//! 2. `Socket::start` - spawn the task, which calls the [`Connector`]
//! 3. Handshake - Engine.IO open, Socket.IO connect with the token
//! 4. Session - pings answered, events dispatched, emits written
//! 5. Loss - backoff and retry; server disconnect retries at once
//! 6. `Socket::close` - send disconnect, stop the task
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnection delay policy |
//! | `connector` | Transport traits and WebSocket connector |
//! | `listeners` | Named-event listener table |
//! | `socket` | Socket handle and task loop |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnection delay policy.
pub mod backoff;

/// Transport traits and the WebSocket connector.
pub mod connector;

/// Named-event listener table.
pub mod listeners;

/// Socket handle and connection task.
pub mod socket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::Backoff;
pub use connector::{
    ConnectRequest, Connector, Transport, TransportKind, WsConnector, endpoint_url,
};
pub use listeners::{Listener, ListenerTable};
pub use socket::{ConnectionState, Socket, SocketConfig, WeakSocket};

//! Named events exchanged over the realtime channel.
//!
//! # Event Names
//!
//! | Direction | Events |
//! |-----------|--------|
//! | Server → client | `new_message`, `chat_updated` |
//! | Client → server | `join_session`, `leave_session` |
//! | Local lifecycle | `connect`, `disconnect`, `connect_error`, `reconnect`, `reconnect_attempt`, `reconnect_error`, `reconnect_failed` |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::SessionId;

// ============================================================================
// Event Names
// ============================================================================

/// Well-known event names.
pub mod names {
    /// Connection (or reconnection) established.
    pub const CONNECT: &str = "connect";
    /// Connection lost. Payload is the reason string.
    pub const DISCONNECT: &str = "disconnect";
    /// A connection attempt failed. Payload is the error message.
    pub const CONNECT_ERROR: &str = "connect_error";
    /// Reconnected after a loss. Payload is the attempt number.
    pub const RECONNECT: &str = "reconnect";
    /// A reconnection attempt is starting. Payload is the attempt number.
    pub const RECONNECT_ATTEMPT: &str = "reconnect_attempt";
    /// A reconnection attempt failed. Payload is the error message.
    pub const RECONNECT_ERROR: &str = "reconnect_error";
    /// Reconnection attempts exhausted.
    pub const RECONNECT_FAILED: &str = "reconnect_failed";

    /// New WhatsApp message in a session.
    pub const NEW_MESSAGE: &str = "new_message";
    /// Chat metadata changed in a session.
    pub const CHAT_UPDATED: &str = "chat_updated";

    /// Subscribe to a session room.
    pub const JOIN_SESSION: &str = "join_session";
    /// Unsubscribe from a session room.
    pub const LEAVE_SESSION: &str = "leave_session";
}

/// Returns `true` for events generated locally by the connection lifecycle.
///
/// These are never sent to or received from the server.
#[must_use]
pub fn is_lifecycle(name: &str) -> bool {
    matches!(
        name,
        names::CONNECT
            | names::DISCONNECT
            | names::CONNECT_ERROR
            | names::RECONNECT
            | names::RECONNECT_ATTEMPT
            | names::RECONNECT_ERROR
            | names::RECONNECT_FAILED
    )
}

// ============================================================================
// Event
// ============================================================================

/// A named event with its JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name.
    pub name: String,
    /// Event payload (`null` when the event carries no arguments).
    pub payload: Value,
}

impl Event {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Parses the event into a typed variant.
    ///
    /// Events whose payload does not match the expected shape fall back to
    /// [`ServerEvent::Other`].
    #[must_use]
    pub fn parse(&self) -> ServerEvent {
        match self.name.as_str() {
            names::NEW_MESSAGE => {
                if let Ok(p) = NewMessagePayload::deserialize(&self.payload) {
                    return ServerEvent::NewMessage {
                        session_id: p.session_id,
                        chat_id: p.chat_id,
                        message: p.message,
                    };
                }
            }
            names::CHAT_UPDATED => {
                if let Ok(p) = ChatUpdatedPayload::deserialize(&self.payload) {
                    return ServerEvent::ChatUpdated {
                        session_id: p.session_id,
                    };
                }
            }
            _ => {}
        }
        ServerEvent::Other(self.clone())
    }
}

// ============================================================================
// ServerEvent
// ============================================================================

/// Typed server-pushed events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A message arrived in a chat.
    NewMessage {
        /// Session the chat belongs to.
        session_id: SessionId,
        /// Chat identifier (WhatsApp JID).
        chat_id: String,
        /// Raw message object.
        message: Value,
    },

    /// A chat in the session changed (unread count, last message, ...).
    ChatUpdated {
        /// Session whose chat list should be refreshed.
        session_id: SessionId,
    },

    /// Any other event.
    Other(Event),
}

// ============================================================================
// Payload Shapes
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMessagePayload {
    #[serde(alias = "session_id")]
    session_id: SessionId,
    #[serde(alias = "chat_id")]
    chat_id: String,
    #[serde(default)]
    message: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatUpdatedPayload {
    #[serde(alias = "session_id")]
    session_id: SessionId,
}

// ============================================================================
// Tests
// ============================================================================

//! Realtime channel wire protocol.
//!
//! The backend speaks Socket.IO v5 over Engine.IO v4 on a WebSocket.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `0{...}` | Server → client | Engine.IO open (ping settings) |
//! | `2` / `3` | Server → client / reply | Heartbeat ping / pong |
//! | `40{"token":...}` | Client → server | Socket.IO connect with auth |
//! | `40{"sid":...}` | Server → client | Connect accepted |
//! | `44{...}` | Server → client | Connect refused |
//! | `42[name, payload]` | Both | Named event |
//! | `41` | Both | Namespace disconnect |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Event names and typed server events |
//! | `packet` | Engine.IO / Socket.IO codec |

// ============================================================================
// Submodules
// ============================================================================

/// Named events and typed server events.
pub mod event;

/// Engine.IO and Socket.IO packet codec.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{Event, ServerEvent, is_lifecycle, names};
pub use packet::{EnginePacket, OpenPayload, SocketPacket, SocketPacketKind};

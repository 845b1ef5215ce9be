//! Engine.IO and Socket.IO packet codec.
//!
//! Every WebSocket text frame carries one Engine.IO packet. Engine.IO
//! `message` packets carry one Socket.IO packet.
//!
//! # Format
//!
//! ```text
//! Engine.IO:  <type digit><data>                       e.g. "2", "0{...}"
//! Socket.IO:  <type>[<namespace>,][<ack id>][<json>]   e.g. "42[\"new_message\",{...}]"
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Namespace used when a packet omits one.
pub const DEFAULT_NAMESPACE: &str = "/";

// ============================================================================
// OpenPayload
// ============================================================================

/// Handshake data sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    /// Engine.IO session id.
    pub sid: String,

    /// Transports the server would upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Interval between server pings, in milliseconds.
    pub ping_interval: u64,

    /// Grace period after a missed ping, in milliseconds.
    pub ping_timeout: u64,

    /// Largest payload the server accepts, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

// ============================================================================
// EnginePacket
// ============================================================================

/// An Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// `0` - handshake from server.
    Open(OpenPayload),
    /// `1` - transport is closing.
    Close,
    /// `2` - heartbeat from server.
    Ping,
    /// `3` - heartbeat reply.
    Pong,
    /// `4` - carries a Socket.IO packet.
    Message(String),
    /// `5` - transport upgrade.
    Upgrade,
    /// `6` - no-op.
    Noop,
}

impl EnginePacket {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] if the frame is empty, the type is unknown, or the
    /// open payload is malformed.
    pub fn decode(frame: &str) -> Result<Self> {
        let kind = frame
            .bytes()
            .next()
            .ok_or_else(|| Error::protocol("empty Engine.IO frame"))?;
        if !kind.is_ascii_digit() {
            return Err(Error::protocol(format!(
                "invalid Engine.IO packet type: {:?}",
                frame.chars().next().unwrap_or_default()
            )));
        }
        let data = &frame[1..];

        match kind {
            b'0' => {
                let payload = serde_json::from_str(data)
                    .map_err(|e| Error::protocol(format!("invalid open payload: {e}")))?;
                Ok(Self::Open(payload))
            }
            b'1' => Ok(Self::Close),
            b'2' => Ok(Self::Ping),
            b'3' => Ok(Self::Pong),
            b'4' => Ok(Self::Message(data.to_owned())),
            b'5' => Ok(Self::Upgrade),
            b'6' => Ok(Self::Noop),
            other => Err(Error::protocol(format!(
                "unknown Engine.IO packet type: {}",
                other as char
            ))),
        }
    }

    /// Encodes the packet as a text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(payload) => {
                format!("0{}", serde_json::to_string(payload).unwrap_or_default())
            }
            Self::Close => "1".to_owned(),
            Self::Ping => "2".to_owned(),
            Self::Pong => "3".to_owned(),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_owned(),
            Self::Noop => "6".to_owned(),
        }
    }
}

// ============================================================================
// SocketPacketKind
// ============================================================================

/// Socket.IO packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    /// `0` - namespace connect (client) or connect ack (server).
    Connect,
    /// `1` - namespace disconnect.
    Disconnect,
    /// `2` - named event.
    Event,
    /// `3` - acknowledgement.
    Ack,
    /// `4` - namespace connect refused.
    ConnectError,
}

impl SocketPacketKind {
    /// Wire digit for this packet type.
    #[inline]
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'0' => Ok(Self::Connect),
            b'1' => Ok(Self::Disconnect),
            b'2' => Ok(Self::Event),
            b'3' => Ok(Self::Ack),
            b'4' => Ok(Self::ConnectError),
            b'5' | b'6' => Err(Error::protocol("binary packets are not supported")),
            other => Err(Error::protocol(format!(
                "unknown Socket.IO packet type: {:?}",
                other as char
            ))),
        }
    }
}

// ============================================================================
// SocketPacket
// ============================================================================

/// A Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    /// Packet type.
    pub kind: SocketPacketKind,
    /// Namespace, `/` by default.
    pub namespace: String,
    /// Acknowledgement id, if the sender expects an ack.
    pub ack_id: Option<u64>,
    /// JSON payload.
    pub data: Option<Value>,
}

impl SocketPacket {
    /// Creates a packet on the default namespace.
    #[inline]
    #[must_use]
    pub fn new(kind: SocketPacketKind, data: Option<Value>) -> Self {
        Self {
            kind,
            namespace: DEFAULT_NAMESPACE.to_owned(),
            ack_id: None,
            data,
        }
    }

    /// Creates a namespace connect carrying the auth payload.
    #[inline]
    #[must_use]
    pub fn connect(auth: Value) -> Self {
        Self::new(SocketPacketKind::Connect, Some(auth))
    }

    /// Creates a namespace disconnect.
    #[inline]
    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(SocketPacketKind::Disconnect, None)
    }

    /// Creates a named event with a single payload argument.
    ///
    /// A `null` payload is still sent as an argument (`["name",null]`).
    #[must_use]
    pub fn event(name: &str, payload: Value) -> Self {
        Self::new(SocketPacketKind::Event, Some(json!([name, payload])))
    }

    /// Splits an event packet into its name and payload.
    ///
    /// Zero arguments yield `null`, one argument is returned as is, and
    /// several arguments are returned as an array. Returns `None` for
    /// non-event packets or malformed event data.
    #[must_use]
    pub fn event_parts(&self) -> Option<(String, Value)> {
        if self.kind != SocketPacketKind::Event {
            return None;
        }
        let Some(Value::Array(items)) = &self.data else {
            return None;
        };
        let (name, args) = items.split_first()?;
        let name = name.as_str()?.to_owned();

        let payload = match args {
            [] => Value::Null,
            [single] => single.clone(),
            many => Value::Array(many.to_vec()),
        };
        Some((name, payload))
    }

    /// Decodes the body of an Engine.IO message packet.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] for unknown or binary packet types, an ack id that
    /// overflows, or invalid JSON.
    pub fn decode(body: &str) -> Result<Self> {
        let kind_byte = body
            .bytes()
            .next()
            .ok_or_else(|| Error::protocol("empty Socket.IO packet"))?;
        let kind = SocketPacketKind::from_byte(kind_byte)?;
        let mut rest = &body[1..];

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let ns = &rest[..idx];
                    rest = &rest[idx + 1..];
                    ns.to_owned()
                }
                None => {
                    let ns = rest.to_owned();
                    rest = "";
                    ns
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_owned()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| Error::protocol(format!("invalid ack id: {e}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        Ok(Self {
            kind,
            namespace,
            ack_id,
            data,
        })
    }

    /// Encodes the packet body (without the Engine.IO prefix).
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());
        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(ref data) = self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Wraps the packet in an Engine.IO message frame.
    #[inline]
    #[must_use]
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

// ============================================================================
// Tests
// ============================================================================

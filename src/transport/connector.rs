//! Transport seam and the default WebSocket implementation.
//!
//! A [`Connector`] opens one framed text [`Transport`] per connection
//! attempt. The socket task only sees these traits, so tests can script the
//! server side without a network.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Engine.IO protocol revision spoken by this client.
const ENGINE_IO_VERSION: &str = "4";

// ============================================================================
// TransportKind
// ============================================================================

/// Transport modes the client may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Persistent WebSocket.
    WebSocket,
    /// HTTP long-polling fallback.
    Polling,
}

impl TransportKind {
    /// Returns `true` if this client implements the transport.
    #[inline]
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::WebSocket)
    }

    /// Engine.IO name of the transport, as sent in the `transport` query.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

// ============================================================================
// ConnectRequest
// ============================================================================

/// Everything a connector needs to open a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Full endpoint URL (`ws://host/socket.io/?EIO=4&transport=websocket`).
    pub url: Url,
    /// Bearer token.
    pub token: String,
    /// Attach the token as an `Authorization` header on the upgrade request.
    pub with_credentials: bool,
}

// ============================================================================
// Traits
// ============================================================================

/// A bidirectional stream of text frames.
#[async_trait]
pub trait Transport: Send {
    /// Sends one frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Receives the next frame. `None` means the peer closed the transport.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Closes the transport.
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new transport for one connection attempt.
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// Endpoint
// ============================================================================

/// Builds the realtime endpoint from the API base URL.
///
/// `http`/`https` map to `ws`/`wss`. Only the origin of `base` is kept; the
/// socket path replaces any path it carries.
///
/// # Errors
///
/// [`Error::Config`] for schemes other than `http`, `https`, `ws`, `wss`,
/// or for a transport this client does not implement.
pub fn endpoint_url(base: &Url, path: &str, transport: TransportKind) -> Result<Url> {
    if !transport.is_supported() {
        return Err(Error::config(format!(
            "transport {} is not supported",
            transport.as_str()
        )));
    }

    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::config(format!("unsupported URL scheme: {other}")));
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::config(format!("cannot use scheme {scheme} for {base}")))?;
    url.set_path(&format!("/{}/", path.trim_matches('/')));
    url.set_fragment(None);
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", transport.as_str());

    Ok(url)
}

// ============================================================================
// WsConnector
// ============================================================================

/// Default connector: a WebSocket via `tokio-tungstenite`.
///
/// `wss://` endpoints need the crate's `rustls` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Transport>> {
        let mut ws_request = request.url.as_str().into_client_request()?;

        if request.with_credentials {
            let value = HeaderValue::from_str(&format!("Bearer {}", request.token))
                .map_err(|e| Error::config(format!("token is not a valid header value: {e}")))?;
            ws_request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, response) = connect_async(ws_request).await?;
        debug!(url = %request.url, status = %response.status(), "WebSocket upgrade completed");

        Ok(Box::new(WsTransport { stream }))
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// WebSocket carrying one Engine.IO packet per text frame.
struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(Message::Close(frame))) => {
                    trace!(?frame, "WebSocket close frame");
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

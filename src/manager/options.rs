//! Connection options and environment configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use realtime_link::ConnectionOptions;
//!
//! let options = ConnectionOptions::new("https://api.console.example")
//!     .with_max_reconnect_attempts(20)
//!     .with_timeout(Duration::from_secs(10))
//!     .with_rejoin_sessions();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::backoff::{Backoff, DEFAULT_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY_MAX};
use crate::transport::connector::endpoint_url;
use crate::transport::socket::SocketConfig;

pub use crate::transport::connector::TransportKind;

// ============================================================================
// Constants
// ============================================================================

/// Environment variable holding the API base URL.
pub const ENV_BASE_URL: &str = "MESSAGING_API_URL";

/// Environment variable overriding the socket path.
pub const ENV_SOCKET_PATH: &str = "MESSAGING_SOCKET_PATH";

/// Environment variable overriding the reconnection attempt bound.
pub const ENV_RECONNECT_ATTEMPTS: &str = "MESSAGING_RECONNECT_ATTEMPTS";

/// Default socket path on the backend.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

/// Default bound on consecutive failed attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default bound on one connection attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Settings for a [`ConnectionManager`](super::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// API base URL (`http(s)://` or `ws(s)://`).
    pub base_url: Option<String>,

    /// Socket path on the backend.
    pub path: String,

    /// Send the token as an `Authorization` header as well.
    pub with_credentials: bool,

    /// Permitted transports, in preference order.
    pub transports: Vec<TransportKind>,

    /// Reconnect automatically.
    pub reconnection: bool,

    /// Consecutive failed attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// First reconnection delay and linear step.
    pub reconnect_delay: Duration,

    /// Reconnection delay cap.
    pub reconnect_delay_max: Duration,

    /// Bound on one connection attempt, handshake included.
    pub timeout: Duration,

    /// Keep listeners registered before the first `connect` and install them
    /// on the socket once it exists.
    pub buffer_early_listeners: bool,

    /// Re-join session rooms after an automatic reconnect.
    pub rejoin_sessions: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            path: DEFAULT_SOCKET_PATH.to_owned(),
            with_credentials: true,
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            reconnection: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reconnect_delay_max: DEFAULT_RECONNECT_DELAY_MAX,
            timeout: DEFAULT_TIMEOUT,
            buffer_early_listeners: true,
            rejoin_sessions: false,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options for the given API base URL.
    #[inline]
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Reads options from the process environment.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if [`ENV_BASE_URL`] is unset or a value is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads options through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the base URL is missing or a value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup(ENV_BASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::config(format!("{ENV_BASE_URL} is not set")))?;

        let mut options = Self::new(base_url.trim());

        if let Some(path) = lookup(ENV_SOCKET_PATH).filter(|v| !v.trim().is_empty()) {
            options.path = path.trim().to_owned();
        }

        if let Some(raw) = lookup(ENV_RECONNECT_ATTEMPTS) {
            options.max_reconnect_attempts = raw.trim().parse().map_err(|e| {
                Error::config(format!("{ENV_RECONNECT_ATTEMPTS}={raw:?} is invalid: {e}"))
            })?;
        }

        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the API base URL.
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the socket path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Stops sending the `Authorization` header.
    #[inline]
    #[must_use]
    pub fn without_credentials(mut self) -> Self {
        self.with_credentials = false;
        self
    }

    /// Sets the permitted transports.
    #[inline]
    #[must_use]
    pub fn with_transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        self.transports = transports.into_iter().collect();
        self
    }

    /// Disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn without_reconnection(mut self) -> Self {
        self.reconnection = false;
        self
    }

    /// Sets the bound on consecutive failed attempts.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the first reconnection delay and its cap.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.reconnect_delay_max = max;
        self
    }

    /// Sets the connection attempt timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drops listeners registered before the first `connect`.
    #[inline]
    #[must_use]
    pub fn without_early_listener_buffering(mut self) -> Self {
        self.buffer_early_listeners = false;
        self
    }

    /// Re-joins session rooms after automatic reconnects.
    #[inline]
    #[must_use]
    pub fn with_rejoin_sessions(mut self) -> Self {
        self.rejoin_sessions = true;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Validates the options and resolves the realtime endpoint.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the base URL is missing or unusable, WebSocket is
    /// not among the permitted transports, or the timeout is zero.
    pub fn endpoint(&self) -> Result<Url> {
        let raw = self
            .base_url
            .as_deref()
            .ok_or_else(|| Error::config("base URL is not set"))?;
        let base = Url::parse(raw)?;

        let transport = self
            .transports
            .iter()
            .copied()
            .find(|t| t.is_supported())
            .ok_or_else(|| {
                Error::config(
                    "the websocket transport must be permitted; polling alone is not supported",
                )
            })?;
        if self.timeout.is_zero() {
            return Err(Error::config("timeout must be greater than zero"));
        }

        endpoint_url(&base, &self.path, transport)
    }

    /// Socket settings for a connection authenticated with `token`.
    pub(crate) fn socket_config(&self, endpoint: &Url, token: &str) -> SocketConfig {
        SocketConfig {
            endpoint: endpoint.clone(),
            token: token.to_owned(),
            with_credentials: self.with_credentials,
            reconnection: self.reconnection,
            max_reconnect_attempts: self.max_reconnect_attempts,
            backoff: Backoff::new(self.reconnect_delay, self.reconnect_delay_max),
            timeout: self.timeout,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

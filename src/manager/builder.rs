//! Builder pattern for manager configuration.
//!
//! # Example
//!
//! ```no_run
//! use realtime_link::ConnectionManager;
//!
//! # fn example() -> realtime_link::Result<()> {
//! let manager = ConnectionManager::builder()
//!     .url("https://api.console.example")
//!     .max_reconnect_attempts(10)
//!     .rejoin_sessions(true)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::transport::{Connector, WsConnector};

use super::core::ConnectionManager;
use super::options::ConnectionOptions;

// ============================================================================
// ConnectionManagerBuilder
// ============================================================================

/// Builder for a [`ConnectionManager`].
///
/// Use [`ConnectionManager::builder()`] to create one.
#[derive(Default, Clone)]
pub struct ConnectionManagerBuilder {
    options: ConnectionOptions,
    connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for ConnectionManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManagerBuilder")
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

// ============================================================================
// ConnectionManagerBuilder Implementation
// ============================================================================

impl ConnectionManagerBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API base URL.
    ///
    /// # Arguments
    ///
    /// * `url` - Backend base URL (e.g., "https://api.console.example")
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.options.base_url = Some(url.into());
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the bound on consecutive failed attempts.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.options.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the first reconnection delay and its cap.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.options.reconnect_delay = initial;
        self.options.reconnect_delay_max = max;
        self
    }

    /// Sets the connection attempt timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Enables or disables re-joining session rooms after reconnects.
    #[inline]
    #[must_use]
    pub fn rejoin_sessions(mut self, enabled: bool) -> Self {
        self.options.rejoin_sessions = enabled;
        self
    }

    /// Enables or disables buffering of listeners registered before connect.
    #[inline]
    #[must_use]
    pub fn buffer_early_listeners(mut self, enabled: bool) -> Self {
        self.options.buffer_early_listeners = enabled;
        self
    }

    /// Uses a custom connector instead of the WebSocket one.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Builds the manager with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the URL is missing, the
    ///   transports exclude WebSocket, or the timeout is zero
    /// - [`Error::Url`](crate::Error::Url) if the URL does not parse
    pub fn build(self) -> Result<ConnectionManager> {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector) as Arc<dyn Connector>);
        ConnectionManager::with_connector(self.options, connector)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;

    #[test]
    fn test_build_requires_url() {
        let err = ConnectionManagerBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_applies_settings() {
        let manager = ConnectionManager::builder()
            .url("https://api.console.example")
            .max_reconnect_attempts(3)
            .timeout(Duration::from_secs(5))
            .rejoin_sessions(true)
            .buffer_early_listeners(false)
            .build()
            .unwrap();

        let options = manager.options();
        assert_eq!(options.max_reconnect_attempts, 3);
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!(options.rejoin_sessions);
        assert!(!options.buffer_early_listeners);
        assert_eq!(
            manager.endpoint().as_str(),
            "wss://api.console.example/socket.io/?EIO=4&transport=websocket"
        );
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_url_overrides_options() {
        let manager = ConnectionManager::builder()
            .options(ConnectionOptions::new("http://old.example"))
            .url("http://new.example:8080")
            .build()
            .unwrap();
        assert_eq!(manager.endpoint().host_str(), Some("new.example"));
        assert_eq!(manager.endpoint().port(), Some(8080));
    }
}

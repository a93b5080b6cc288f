//! Builder pattern for bridge configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use grok_bridge::Bridge;
//!
//! # fn example() -> grok_bridge::Result<()> {
//! let bridge = Bridge::builder()
//!     .host("localhost")
//!     .port(5001)
//!     .reconnection_delay(Duration::from_millis(500))
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

use crate::error::{Error, Result};
use crate::page::OriginFilter;
use crate::transport::{ChannelKind, Connector, FrameConnector, SocketConnector};

use super::core::Bridge;
use super::options::{BridgeOptions, TransportKind};

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Builder for configuring a [`Bridge`].
///
/// Use [`Bridge::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct BridgeBuilder {
    /// Collected options.
    options: BridgeOptions,
    /// Replaces the primary WebSocket connector.
    primary: Option<Arc<dyn Connector>>,
    /// Replaces the fallback frame connector.
    fallback: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for BridgeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeBuilder")
            .field("options", &self.options)
            .field("custom_primary", &self.primary.is_some())
            .field("custom_fallback", &self.fallback.is_some())
            .finish()
    }
}

// ============================================================================
// BridgeBuilder Implementation
// ============================================================================

impl BridgeBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the backend host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    /// Sets the backend port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Sets the primary socket path.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.options.path = path.into();
        self
    }

    /// Sets the enabled transports.
    #[inline]
    #[must_use]
    pub fn transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        self.options.transports = transports.into_iter().collect();
        self
    }

    /// Sets primary attempts per connect cycle.
    #[inline]
    #[must_use]
    pub fn reconnection_attempts(mut self, attempts: u32) -> Self {
        self.options.reconnection_attempts = attempts;
        self
    }

    /// Sets the delay between attempts.
    #[inline]
    #[must_use]
    pub fn reconnection_delay(mut self, delay: Duration) -> Self {
        self.options.reconnection_delay = delay;
        self
    }

    /// Sets the per-attempt connect timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Sets whether the bridge connects on start.
    #[inline]
    #[must_use]
    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.options.auto_connect = auto_connect;
        self
    }

    /// Sets the delay before reconnecting after a drop.
    #[inline]
    #[must_use]
    pub fn disconnect_reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.disconnect_reconnect_delay = delay;
        self
    }

    /// Sets consecutive failures that open the fallback.
    #[inline]
    #[must_use]
    pub fn fallback_threshold(mut self, threshold: u32) -> Self {
        self.options.fallback_threshold = Some(threshold);
        self
    }

    /// Sets the fallback frame socket URL.
    #[inline]
    #[must_use]
    pub fn fallback_url(mut self, url: impl Into<String>) -> Self {
        self.options.fallback_url = Some(url.into());
        self
    }

    /// Sets the execution-context match pattern.
    #[inline]
    #[must_use]
    pub fn origin_filter(mut self, pattern: impl Into<String>) -> Self {
        self.options.origin_filter = pattern.into();
        self
    }

    /// Uses a custom connector for the primary channel.
    #[inline]
    #[must_use]
    pub fn primary_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.primary = Some(connector);
        self
    }

    /// Uses a custom connector for the fallback channel.
    #[inline]
    #[must_use]
    pub fn fallback_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.fallback = Some(connector);
        self
    }

    /// Builds the bridge with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the host is empty, attempts or threshold are
    ///   zero, `websocket` is not enabled, or the origin filter is malformed
    /// - [`Error::Url`] if a socket URL is malformed
    pub fn build(self) -> Result<Bridge> {
        self.validate()?;

        let options = self.options;
        let policy = options.policy();
        let filter = OriginFilter::parse(&options.origin_filter)?;

        let primary: Arc<dyn Connector> = match self.primary {
            Some(connector) => connector,
            None => Arc::new(SocketConnector::new(options.primary_url()?, ChannelKind::Primary)),
        };

        let fallback: Option<Arc<dyn Connector>> = match (self.fallback, options.fallback_url()?) {
            _ if !options.polling_enabled() => None,
            (Some(connector), _) => Some(connector),
            (None, Some(url)) => {
                let frame_socket = Arc::new(SocketConnector::new(url, ChannelKind::Fallback));
                Some(Arc::new(FrameConnector::new(frame_socket, &policy)) as Arc<dyn Connector>)
            }
            (None, None) => None,
        };

        Ok(Bridge::new(options, policy, filter, primary, fallback))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl BridgeBuilder {
    fn validate(&self) -> Result<()> {
        let options = &self.options;

        if options.host.trim().is_empty() {
            return Err(Error::config(
                "Backend host is required. Use .host() to set it.\n\
                 Example: Bridge::builder().host(\"localhost\")",
            ));
        }

        if options.reconnection_attempts == 0 {
            return Err(Error::config("reconnectionAttempts must be at least 1"));
        }

        if !options.websocket_enabled() {
            return Err(Error::config(
                "The 'websocket' transport is required for the primary channel",
            ));
        }

        if options.fallback_threshold == Some(0) {
            return Err(Error::config("fallbackThreshold must be at least 1"));
        }

        if let Some(threshold) = options.fallback_threshold
            && options.polling_enabled()
            && threshold > options.reconnection_attempts
        {
            return Err(Error::config(format!(
                "fallbackThreshold ({threshold}) exceeds reconnectionAttempts ({}); \
                 the fallback would never open",
                options.reconnection_attempts
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

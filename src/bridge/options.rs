//! Bridge configuration.
//!
//! [`BridgeOptions`] mirrors the socket client options of the browser
//! extension and can be loaded from JSON:
//!
//! ```json
//! {
//!   "host": "localhost",
//!   "port": 5001,
//!   "transports": ["websocket", "polling"],
//!   "reconnectionAttempts": 10,
//!   "reconnectionDelay": 1000,
//!   "timeout": 5000,
//!   "autoConnect": true
//! }
//! ```
//!
//! Durations are milliseconds on the wire.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::page::DEFAULT_ORIGIN_FILTER;
use crate::transport::ReconnectPolicy;
use crate::transport::machine::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_DISCONNECT_DELAY, DEFAULT_RECONNECTION_ATTEMPTS,
    DEFAULT_RECONNECTION_DELAY,
};

// ============================================================================
// Constants
// ============================================================================

/// Default backend host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default backend port.
pub const DEFAULT_PORT: u16 = 5001;

/// Default primary socket path.
pub const DEFAULT_PATH: &str = "/";

/// Fallback frame socket path used when no `fallbackUrl` is set.
pub const DEFAULT_FALLBACK_PATH: &str = "/frame";

// ============================================================================
// TransportKind
// ============================================================================

/// Transport the bridge may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Primary WebSocket.
    Websocket,
    /// Fallback frame.
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Websocket => f.write_str("websocket"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

// ============================================================================
// BridgeOptions
// ============================================================================

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeOptions {
    /// Backend host.
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Primary socket path.
    pub path: String,

    /// Enabled transports. `websocket` is required; `polling` enables the
    /// fallback frame.
    pub transports: Vec<TransportKind>,

    /// Primary attempts per connect cycle.
    pub reconnection_attempts: u32,

    /// Delay between attempts.
    #[serde(with = "millis")]
    pub reconnection_delay: Duration,

    /// Per-attempt connect timeout.
    #[serde(with = "millis")]
    pub timeout: Duration,

    /// Connect as soon as the bridge starts.
    pub auto_connect: bool,

    /// Delay before reconnecting after an established socket drops.
    #[serde(with = "millis")]
    pub disconnect_reconnect_delay: Duration,

    /// Consecutive failures that open the fallback. Defaults to
    /// `reconnection_attempts`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_threshold: Option<u32>,

    /// Fallback frame socket URL. Defaults to `ws://{host}:{port}/frame`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,

    /// Execution-context match pattern.
    pub origin_filter: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            timeout: DEFAULT_ATTEMPT_TIMEOUT,
            auto_connect: true,
            disconnect_reconnect_delay: DEFAULT_DISCONNECT_DELAY,
            fallback_threshold: None,
            fallback_url: None,
            origin_filter: DEFAULT_ORIGIN_FILTER.to_string(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl BridgeOptions {
    /// Creates default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid bridge options: {e}")))
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl BridgeOptions {
    /// Returns `true` if the primary WebSocket is enabled.
    #[inline]
    #[must_use]
    pub fn websocket_enabled(&self) -> bool {
        self.transports.contains(&TransportKind::Websocket)
    }

    /// Returns `true` if the fallback frame is enabled.
    #[inline]
    #[must_use]
    pub fn polling_enabled(&self) -> bool {
        self.transports.contains(&TransportKind::Polling)
    }

    /// Returns the primary socket URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if host, port and path do not form a URL.
    pub fn primary_url(&self) -> Result<Url> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(Url::parse(&format!("ws://{}:{}{path}", self.host, self.port))?)
    }

    /// Returns the fallback frame URL, or `None` when polling is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the URL is malformed.
    pub fn fallback_url(&self) -> Result<Option<Url>> {
        if !self.polling_enabled() {
            return Ok(None);
        }

        let url = match &self.fallback_url {
            Some(url) => Url::parse(url)?,
            None => Url::parse(&format!(
                "ws://{}:{}{DEFAULT_FALLBACK_PATH}",
                self.host, self.port
            ))?,
        };
        Ok(Some(url))
    }

    /// Returns the reconnect policy these options describe.
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.reconnection_attempts,
            delay: self.reconnection_delay,
            attempt_timeout: self.timeout,
            disconnect_delay: self.disconnect_reconnect_delay,
            fallback_threshold: self
                .fallback_threshold
                .unwrap_or(self.reconnection_attempts)
                .min(self.reconnection_attempts),
            fallback_enabled: self.polling_enabled(),
        }
    }
}

// ============================================================================
// Millisecond Durations
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_extension_client() {
        let options = BridgeOptions::new();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 5001);
        assert_eq!(options.reconnection_attempts, 10);
        assert_eq!(options.reconnection_delay, Duration::from_millis(1000));
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert!(options.auto_connect);
        assert!(options.websocket_enabled());
        assert!(options.polling_enabled());
    }

    #[test]
    fn test_from_json_fills_missing_keys() {
        let options = BridgeOptions::from_json(
            r#"{"port": 6000, "transports": ["websocket"], "reconnectionDelay": 250}"#,
        )
        .expect("parse");

        assert_eq!(options.port, 6000);
        assert_eq!(options.host, "localhost");
        assert_eq!(options.reconnection_delay, Duration::from_millis(250));
        assert!(!options.polling_enabled());
    }

    #[test]
    fn test_from_json_rejects_unknown_transport() {
        let err = BridgeOptions::from_json(r#"{"transports": ["carrier-pigeon"]}"#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_urls() {
        let options = BridgeOptions::new();
        assert_eq!(
            options.primary_url().expect("url").as_str(),
            "ws://localhost:5001/"
        );
        assert_eq!(
            options.fallback_url().expect("url").map(|u| u.to_string()),
            Some("ws://localhost:5001/frame".to_string())
        );

        let no_polling = BridgeOptions {
            transports: vec![TransportKind::Websocket],
            ..BridgeOptions::new()
        };
        assert!(no_polling.fallback_url().expect("url").is_none());
    }

    #[test]
    fn test_policy_threshold_defaults_to_attempts() {
        let options = BridgeOptions {
            reconnection_attempts: 4,
            ..BridgeOptions::new()
        };
        assert_eq!(options.policy().fallback_threshold, 4);

        let eager = BridgeOptions {
            fallback_threshold: Some(1),
            ..options
        };
        assert_eq!(eager.policy().fallback_threshold, 1);
    }

    #[test]
    fn test_policy_caps_threshold_at_attempts() {
        let options = BridgeOptions {
            reconnection_attempts: 3,
            fallback_threshold: Some(5),
            ..BridgeOptions::new()
        };
        assert_eq!(options.policy().fallback_threshold, 3);
    }

    #[test]
    fn test_serializes_camel_case_millis() {
        let json = serde_json::to_value(BridgeOptions::new()).expect("serialize");
        assert_eq!(json["reconnectionAttempts"], 10);
        assert_eq!(json["disconnectReconnectDelay"], 2000);
        assert_eq!(json["originFilter"], "*://grok.com/*");
    }
}

//! Error types for the bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use grok_bridge::{Bridge, Result};
//!
//! fn example() -> Result<()> {
//!     let bridge = Bridge::builder().host("localhost").port(5001).build()?;
//!     let handle = bridge.spawn();
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`] |
//! | Request | [`Error::NoExecutionContext`], [`Error::ExternalCall`], [`Error::EmptyResult`], [`Error::StreamRead`], [`Error::PageClosed`], [`Error::PageTask`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |
//!
//! Transport errors are recovered by reconnection or fallback and never reach
//! the backend. Request errors are turned into an error
//! [`Response`](crate::relay::Response) and dispatched like any answer.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when bridge options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection to the backend failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connect attempt did not finish in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Channel closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed envelope or page message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// No page session matches the origin filter.
    #[error("No page session matches {filter}. Please open grok.com and log in.")]
    NoExecutionContext {
        /// The origin filter that found nothing.
        filter: String,
    },

    /// The page API answered with a non-success status.
    #[error("HTTP error! Status: {status}")]
    ExternalCall {
        /// HTTP status code.
        status: u16,
        /// Response body, if any was readable.
        body: String,
    },

    /// The response stream ended without any text.
    #[error("Empty response from Grok API")]
    EmptyResult,

    /// Reading the response stream failed.
    #[error("Stream read failed: {message}")]
    StreamRead {
        /// Description of the read failure.
        message: String,
    },

    /// The page session was closed while a request was running.
    #[error("Page session closed")]
    PageClosed,

    /// The page session task failed before producing an answer.
    #[error("Page task failed: {message}")]
    PageTask {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a no-execution-context error.
    #[inline]
    pub fn no_execution_context(filter: impl Into<String>) -> Self {
        Self::NoExecutionContext {
            filter: filter.into(),
        }
    }

    /// Creates an external call error.
    #[inline]
    pub fn external_call(status: u16, body: impl Into<String>) -> Self {
        Self::ExternalCall {
            status,
            body: body.into(),
        }
    }

    /// Creates a stream read error.
    #[inline]
    pub fn stream_read(message: impl Into<String>) -> Self {
        Self::StreamRead {
            message: message.into(),
        }
    }

    /// Creates a page task error.
    #[inline]
    pub fn page_task(message: impl Into<String>) -> Self {
        Self::PageTask {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is fatal to one request only.
    ///
    /// Such errors become an error response instead of a transport failure.
    #[inline]
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::NoExecutionContext { .. }
                | Self::ExternalCall { .. }
                | Self::EmptyResult
                | Self::StreamRead { .. }
                | Self::PageClosed
                | Self::PageTask { .. }
                | Self::Http(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_external_call_display_matches_page_wording() {
        let err = Error::external_call(403, "forbidden");
        assert_eq!(err.to_string(), "HTTP error! Status: 403");
    }

    #[test]
    fn test_empty_result_display() {
        assert_eq!(Error::EmptyResult.to_string(), "Empty response from Grok API");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connection_timeout(5000).is_timeout());
        assert!(!Error::connection("x").is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::connection_timeout(1).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::EmptyResult.is_connection_error());
    }

    #[test]
    fn test_is_request_error() {
        assert!(Error::EmptyResult.is_request_error());
        assert!(Error::external_call(500, "").is_request_error());
        assert!(Error::no_execution_context("*://grok.com/*").is_request_error());
        assert!(Error::PageClosed.is_request_error());
        assert!(!Error::config("x").is_request_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}

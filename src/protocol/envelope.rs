//! Backend envelope carried over the primary socket.
//!
//! Every text frame exchanged with the backend is one JSON envelope naming an
//! event and carrying its payload, mirroring socket-style `emit(event, data)`.
//!
//! # Format
//!
//! ```json
//! { "event": "request", "data": "Tell me a joke" }
//! { "event": "response", "data": { "text": "...", "isError": false } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Backend → relay event carrying a chat request.
pub const REQUEST_EVENT: &str = "request";

/// Relay → backend event carrying the final answer.
pub const RESPONSE_EVENT: &str = "response";

// ============================================================================
// Envelope
// ============================================================================

/// One event exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name.
    pub event: String,

    /// Event payload (opaque for requests).
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Creates an envelope for an arbitrary event.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Creates a `request` envelope.
    #[inline]
    #[must_use]
    pub fn request(data: Value) -> Self {
        Self::new(REQUEST_EVENT, data)
    }

    /// Creates a `response` envelope from a payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the payload cannot be
    /// serialized.
    pub fn response(payload: &ResponsePayload) -> Result<Self> {
        Ok(Self::new(RESPONSE_EVENT, serde_json::to_value(payload)?))
    }

    /// Returns `true` if this is a backend request.
    #[inline]
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.event == REQUEST_EVENT
    }

    /// Returns `true` if this is a relay response.
    #[inline]
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.event == RESPONSE_EVENT
    }
}

// ============================================================================
// ResponsePayload
// ============================================================================

/// Payload of the `response` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Answer text, or a human-readable error.
    pub text: String,

    /// Whether `text` describes a failure.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

// ============================================================================
// Tests
// ============================================================================

//! Page message protocol.
//!
//! Messages exchanged between the relay and a page session worker, shaped like
//! runtime messages between an extension background and its content script.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::RequestId;

// ============================================================================
// PageMessage
// ============================================================================

/// A message exchanged with a page session.
///
/// # Format
///
/// ```json
/// { "type": "request", "data": "prompt", "requestId": "9b2c..." }
/// { "type": "response", "data": "answer", "isError": false }
/// { "type": "debug", "level": "info", "message": "Processing chunk #1" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageMessage {
    /// Relay → page: run this request.
    Request {
        /// Opaque request payload.
        data: Value,
        /// ID the relay admitted the request under.
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
    },

    /// Page → relay: final answer.
    Response {
        /// Answer text or error description.
        data: String,
        /// Whether `data` describes a failure.
        #[serde(rename = "isError", default)]
        is_error: bool,
    },

    /// Page → relay: diagnostic message.
    Debug {
        /// Severity (`info`, `success`, `warning`, `error`, ...).
        #[serde(default = "default_level")]
        level: String,
        /// Human-readable message.
        message: String,
        /// Optional structured detail.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

impl PageMessage {
    /// Creates a `request` message without a relay ID.
    #[inline]
    #[must_use]
    pub fn request(data: Value) -> Self {
        Self::Request {
            data,
            request_id: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let message = PageMessage::request(json!("hi"));
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json, json!({"type": "request", "data": "hi"}));
    }

    #[test]
    fn test_request_carries_relay_id() {
        let id = RequestId::generate();
        let message = PageMessage::Request {
            data: json!("hi"),
            request_id: Some(id),
        };
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["requestId"], json!(id.to_string()));

        let parsed: PageMessage = serde_json::from_value(json).expect("parse");
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_response_without_error_flag() {
        let parsed: PageMessage =
            serde_json::from_value(json!({"type": "response", "data": "Done."})).expect("parse");
        assert_eq!(
            parsed,
            PageMessage::Response {
                data: "Done.".into(),
                is_error: false
            }
        );
    }

    #[test]
    fn test_debug_defaults_level() {
        let parsed: PageMessage =
            serde_json::from_value(json!({"type": "debug", "message": "x"})).expect("parse");
        assert!(matches!(parsed, PageMessage::Debug { ref level, .. } if level == "info"));
    }
}

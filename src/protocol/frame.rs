//! Fallback frame message protocol.
//!
//! The fallback channel talks to its frame through cross-context messages.
//! Each message names its type and optionally carries data.
//!
//! | Type | Direction | Meaning |
//! |------|-----------|---------|
//! | `connected` | frame → relay | frame reached the backend |
//! | `error` | frame → relay | frame connection failed or dropped |
//! | `request` | frame → relay | backend request forwarded by the frame |
//! | `sendResponse` | relay → frame | answer the frame must emit to the backend |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::ChannelEvent;

// ============================================================================
// FrameMessage
// ============================================================================

/// A message crossing the fallback frame boundary.
///
/// # Format
///
/// ```json
/// { "type": "sendResponse", "data": { "text": "...", "isError": false } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum FrameMessage {
    /// Frame connected to the backend.
    Connected,
    /// Frame connection error.
    Error(String),
    /// Backend request received by the frame.
    Request(Value),
    /// Response payload to emit to the backend.
    SendResponse(Value),
}

impl FrameMessage {
    /// Converts a frame → relay message into a channel event.
    ///
    /// Returns `None` for `sendResponse`, which only flows relay → frame.
    #[must_use]
    pub fn into_event(self) -> Option<ChannelEvent> {
        match self {
            Self::Connected => Some(ChannelEvent::Connected),
            Self::Error(reason) => Some(ChannelEvent::Error(reason)),
            Self::Request(data) => Some(ChannelEvent::Request(data)),
            Self::SendResponse(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_connected_has_no_data() {
        let json = serde_json::to_value(FrameMessage::Connected).expect("serialize");
        assert_eq!(json, json!({"type": "connected"}));

        let parsed: FrameMessage =
            serde_json::from_value(json!({"type": "connected"})).expect("parse");
        assert_eq!(parsed, FrameMessage::Connected);
    }

    #[test]
    fn test_send_response_shape() {
        let message = FrameMessage::SendResponse(json!({"text": "ok"}));
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json, json!({"type": "sendResponse", "data": {"text": "ok"}}));
    }

    #[test]
    fn test_into_event() {
        assert!(matches!(
            FrameMessage::Connected.into_event(),
            Some(ChannelEvent::Connected)
        ));
        assert!(matches!(
            FrameMessage::Request(json!("hi")).into_event(),
            Some(ChannelEvent::Request(_))
        ));
        assert!(FrameMessage::SendResponse(json!(null)).into_event().is_none());
    }
}

//! Request and response values flowing through the relay.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Error;
use crate::identifiers::RequestId;
use crate::protocol::ResponsePayload;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of every per-request error text sent to the backend.
pub const ERROR_PREFIX: &str = "Error communicating with Grok";

// ============================================================================
// RelayRequest
// ============================================================================

/// A backend request admitted (or about to be admitted) by the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    /// Locally generated ID.
    pub id: RequestId,

    /// Opaque payload as received from the backend.
    pub payload: Value,
}

impl RelayRequest {
    /// Wraps a backend payload with a fresh ID.
    #[inline]
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            id: RequestId::generate(),
            payload,
        }
    }

    /// Returns the prompt text carried by the payload.
    ///
    /// A string payload is the prompt itself; an object may carry it under
    /// `message` or `prompt`, or as a chat-completions `messages` array.
    /// Anything else is sent as its JSON text.
    #[must_use]
    pub fn prompt(&self) -> String {
        prompt_of(&self.payload)
    }
}

/// Extracts the prompt text from a request payload.
#[must_use]
pub fn prompt_of(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("prompt"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                map.get("messages")
                    .and_then(Value::as_array)
                    .map(|messages| format_messages(messages.as_slice()))
            })
            .unwrap_or_else(|| payload.to_string()),
        other => other.to_string(),
    }
}

/// Flattens chat-completions `messages` into one prompt.
///
/// System messages are joined into a leading `System:` block; user and
/// assistant turns follow in order as `User:` / `Assistant:` paragraphs.
/// Other roles are skipped.
#[must_use]
pub fn format_messages(messages: &[Value]) -> String {
    fn role(message: &Value) -> &str {
        message.get("role").and_then(Value::as_str).unwrap_or_default()
    }
    let content = |message: &Value| match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let mut prompt = String::new();

    let system: String = messages
        .iter()
        .filter(|message| role(message) == "system")
        .map(|message| content(message) + "\n")
        .collect();
    if !system.is_empty() {
        prompt.push_str(&format!("System: {}\n\n", system.trim()));
    }

    for message in messages {
        let label = match role(message) {
            "user" => "User",
            "assistant" => "Assistant",
            _ => continue,
        };
        prompt.push_str(&format!("{label}: {}\n\n", content(message)));
    }

    prompt.trim().to_string()
}

// ============================================================================
// Response
// ============================================================================

/// The single answer produced for an admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Request this answers.
    pub request_id: RequestId,

    /// Answer text, or a human-readable error.
    pub text: String,

    /// Whether `text` describes a failure.
    pub is_error: bool,
}

impl Response {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn success(request_id: RequestId, text: impl Into<String>) -> Self {
        Self {
            request_id,
            text: text.into(),
            is_error: false,
        }
    }

    /// Creates an error response from a request error.
    #[must_use]
    pub fn failure(request_id: RequestId, error: &Error) -> Self {
        Self {
            request_id,
            text: format!("{ERROR_PREFIX}: {error}"),
            is_error: true,
        }
    }

    /// Converts to the wire payload of the `response` event.
    #[must_use]
    pub fn to_payload(&self) -> ResponsePayload {
        ResponsePayload {
            text: self.text.clone(),
            is_error: self.is_error,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

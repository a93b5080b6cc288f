//! Records of the page's line-delimited response stream.
//!
//! Each stream line is one JSON record. Only two shapes matter:
//!
//! ```json
//! {"result":{"response":{"token":"Hel"}}}
//! {"result":{"response":{"modelResponse":{"message":"Done."}}}}
//! ```
//!
//! Everything else (metadata, titles, unknown fields) parses into
//! [`RecordKind::Other`].

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

// ============================================================================
// StreamRecord
// ============================================================================

/// One parsed stream line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamRecord {
    /// Result wrapper.
    #[serde(default)]
    pub result: Option<RecordResult>,
}

/// `result` object of a record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordResult {
    /// `response` object of a record.
    #[serde(default)]
    pub response: Option<RecordResponse>,
}

/// `result.response` object of a record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordResponse {
    /// Incremental token.
    #[serde(default)]
    pub token: Option<String>,

    /// Complete message, present once generation finished.
    #[serde(rename = "modelResponse", default)]
    pub model_response: Option<ModelResponse>,
}

/// `result.response.modelResponse` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelResponse {
    /// Full answer text.
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// RecordKind
// ============================================================================

/// What a record contributes to the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// Completion marker carrying the full answer.
    Complete(String),
    /// Incremental token to append.
    Token(String),
    /// Record with nothing to contribute.
    Other,
}

impl StreamRecord {
    /// Parses one stream line.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed lines.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Classifies the record. A completion marker wins over a token.
    #[must_use]
    pub fn into_kind(self) -> RecordKind {
        let Some(response) = self.result.and_then(|result| result.response) else {
            return RecordKind::Other;
        };

        if let Some(model_response) = response.model_response {
            return RecordKind::Complete(model_response.message);
        }

        match response.token {
            Some(token) if !token.is_empty() => RecordKind::Token(token),
            _ => RecordKind::Other,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Reconstructs the page's streamed answer.
//!
//! The page answers with a chunked, newline-delimited JSON stream. The
//! aggregator frames lines across chunk boundaries, skips lines it cannot
//! parse, appends incremental tokens, and stops reading as soon as a
//! completion record carries the full message.
//!
//! # Outcome
//!
//! | Stream | Response |
//! |--------|----------|
//! | completion record seen | its message, success |
//! | ended with tokens | concatenated tokens, success |
//! | ended with no text | `Empty response from Grok API`, error |
//! | read failure | failure description, error |

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::identifiers::RequestId;
use crate::protocol::{RecordKind, StreamRecord};
use crate::relay::Response;

use super::lines::LineBuffer;
use super::{PREVIEW_CHARS, preview};

// ============================================================================
// LineOutcome
// ============================================================================

/// What happened to one stream line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank line.
    Blank,
    /// Line was not a JSON record.
    Malformed,
    /// Record carried nothing to append.
    Ignored,
    /// Token appended.
    Token,
    /// Completion record replaced the text.
    Complete,
}

// ============================================================================
// StreamSession
// ============================================================================

/// Accumulating state for one in-flight streamed answer.
#[derive(Debug, Clone)]
pub struct StreamSession {
    /// Request being answered.
    pub request_id: RequestId,
    /// Text accumulated so far.
    pub accumulated_text: String,
    /// Set once a completion record was seen.
    pub complete: bool,
    /// Chunks read.
    pub chunk_count: usize,
    /// Lines skipped as malformed.
    pub malformed_count: usize,
}

impl StreamSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            accumulated_text: String::new(),
            complete: false,
            chunk_count: 0,
            malformed_count: 0,
        }
    }

    /// Applies one complete line to the session.
    pub fn apply_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Blank;
        }

        let record = match StreamRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                self.malformed_count += 1;
                debug!(
                    request_id = %self.request_id,
                    error = %e,
                    line = %preview(line, PREVIEW_CHARS),
                    "Failed to parse stream line"
                );
                return LineOutcome::Malformed;
            }
        };

        match record.into_kind() {
            RecordKind::Complete(message) => {
                debug!(
                    request_id = %self.request_id,
                    length = message.len(),
                    preview = %preview(&message, PREVIEW_CHARS),
                    "Received complete response"
                );
                self.accumulated_text = message;
                self.complete = true;
                LineOutcome::Complete
            }
            RecordKind::Token(token) => {
                self.accumulated_text.push_str(&token);
                trace!(
                    request_id = %self.request_id,
                    current_length = self.accumulated_text.len(),
                    "Added token"
                );
                LineOutcome::Token
            }
            RecordKind::Other => LineOutcome::Ignored,
        }
    }

    /// Ends the session and produces its response.
    #[must_use]
    pub fn finish(self) -> Response {
        if self.accumulated_text.is_empty() {
            warn!(request_id = %self.request_id, chunks = self.chunk_count, "Empty response stream");
            return Response::failure(self.request_id, &Error::EmptyResult);
        }

        Response::success(self.request_id, self.accumulated_text)
    }
}

// ============================================================================
// StreamAggregator
// ============================================================================

/// Consumes a chunk stream into one [`Response`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamAggregator;

impl StreamAggregator {
    /// Creates an aggregator.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Reads `stream` until a completion record or its end.
    ///
    /// Never fails: read errors and empty streams become error responses.
    pub async fn consume<S, B, E>(&self, request_id: RequestId, mut stream: S) -> Response
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let mut session = StreamSession::new(request_id);
        let mut lines = LineBuffer::new();

        debug!(%request_id, "Starting to process response stream");

        'read: while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(%request_id, error = %e, "Response stream read failed");
                    return Response::failure(request_id, &Error::stream_read(e.to_string()));
                }
            };

            session.chunk_count += 1;
            trace!(
                %request_id,
                chunk = session.chunk_count,
                size = chunk.as_ref().len(),
                "Processing chunk"
            );

            for line in lines.push(chunk.as_ref()) {
                if session.apply_line(&line) == LineOutcome::Complete {
                    break 'read;
                }
            }
        }

        if !session.complete
            && let Some(line) = lines.finish()
        {
            session.apply_line(&line);
        }

        debug!(
            %request_id,
            chunks = session.chunk_count,
            malformed = session.malformed_count,
            length = session.accumulated_text.len(),
            complete = session.complete,
            "Stream processing complete"
        );

        session.finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

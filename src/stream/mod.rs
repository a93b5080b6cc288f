//! Streaming response aggregation.
//!
//! Turns the page's chunked, line-delimited answer into one final text.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `aggregator` | [`StreamAggregator`] and [`StreamSession`] |
//! | `lines` | [`LineBuffer`] newline framing |

// ============================================================================
// Submodules
// ============================================================================

/// Stream consumption into a final response.
pub mod aggregator;

/// Newline framing across chunk boundaries.
pub mod lines;

// ============================================================================
// Re-exports
// ============================================================================

pub use aggregator::{LineOutcome, StreamAggregator, StreamSession};
pub use lines::LineBuffer;

// ============================================================================
// Log Previews
// ============================================================================

/// Characters kept when logging long texts.
pub(crate) const PREVIEW_CHARS: usize = 100;

/// Shortens `text` to `max_chars` characters, marking the cut with `...`.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_text_unchanged() {
        assert_eq!(preview("hello", 100), "hello");
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        assert_eq!(preview("ééééé", 3), "ééé...");
        assert_eq!(preview("abc", 3), "abc");
    }
}

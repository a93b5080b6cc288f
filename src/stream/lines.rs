//! Newline framing across arbitrary chunk boundaries.

// ============================================================================
// LineBuffer
// ============================================================================

/// Splits a byte stream into lines, carrying partial lines between chunks.
///
/// Bytes are buffered undecoded, so a multi-byte UTF-8 sequence split across
/// two chunks is decoded only once the whole line is present.
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Bytes after the last newline seen so far.
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Creates an empty buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed.
    ///
    /// Returned lines exclude the newline and a trailing `\r`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Earlier bytes hold no newline, so only the new chunk is scanned.
        let Some(offset) = chunk.iter().rposition(|&b| b == b'\n') else {
            self.pending.extend_from_slice(chunk);
            return Vec::new();
        };

        let last_newline = self.pending.len() + offset;
        self.pending.extend_from_slice(chunk);

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Takes the unterminated trailing line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }

        let line = std::mem::take(&mut self.pending);
        Some(decode_line(&line))
    }

    /// Number of buffered bytes waiting for a newline.
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(&*text).to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"a\nb\n"), vec!["a", "b"]);
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_partial_line_is_carried() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"tok").is_empty());
        assert_eq!(buffer.pending_len(), 5);
        assert_eq!(buffer.push(b"en\":1}\nnext"), vec!["{\"token\":1}"]);
        assert_eq!(buffer.finish(), Some("next".to_string()));
    }

    #[test]
    fn test_blank_lines_are_kept_for_caller() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"a\r\n"), vec!["a"]);
    }

    #[test]
    fn test_long_line_in_small_chunks() {
        let line = format!("{{\"token\":\"{}\"}}", "x".repeat(4096));
        let mut buffer = LineBuffer::new();

        for chunk in line.as_bytes().chunks(7) {
            assert!(buffer.push(chunk).is_empty());
        }
        assert_eq!(buffer.pending_len(), line.len());

        assert_eq!(buffer.push(b"\nnext"), vec![line]);
        assert_eq!(buffer.pending_len(), 4);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let bytes = "héllo\n".as_bytes();
        let mut buffer = LineBuffer::new();
        // split inside the two-byte 'é'
        assert!(buffer.push(&bytes[..2]).is_empty());
        assert_eq!(buffer.push(&bytes[2..]), vec!["héllo"]);
    }
}

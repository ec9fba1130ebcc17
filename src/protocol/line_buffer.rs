// src/protocol/line_buffer.rs

//! Reassembly of newline-delimited lines from arbitrary byte chunks.

/// Byte buffer holding at most one incomplete line between calls.
///
/// Chunks are kept as raw bytes so that a UTF-8 sequence split across two
/// reads is only decoded once the whole line is present.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    ///
    /// Lines are trimmed; lines that are empty after trimming are skipped.
    /// The trailing fragment after the last newline stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(normalise)
            .collect()
    }

    /// Flush the trailing fragment at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        normalise(&rest)
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }
}

fn normalise(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_partial_suffix_until_newline() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"type\":\"main_status\"").is_empty());
        assert_eq!(buf.pending(), b"{\"type\":\"main_status\"");

        let lines = buf.push(b",\"payload\":\"Working\"}\nnext");
        assert_eq!(lines, vec![r#"{"type":"main_status","payload":"Working"}"#]);
        assert_eq!(buf.pending(), b"next");
    }

    #[test]
    fn skips_blank_lines_and_carriage_returns() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"a\r\n\n   \nb\n");
        assert_eq!(lines, vec!["a", "b"]);
        assert!(buf.pending().is_empty());
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let text = "Sanità\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buf = LineBuffer::new();
        assert!(buf.push(&text[..split]).is_empty());
        assert_eq!(buf.push(&text[split..]), vec!["Sanità"]);
    }

    #[test]
    fn finish_flushes_unterminated_line_once() {
        let mut buf = LineBuffer::new();
        buf.push(b"tail");
        assert_eq!(buf.finish().as_deref(), Some("tail"));
        assert_eq!(buf.finish(), None);
    }
}

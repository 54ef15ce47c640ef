//! Minimal SSE decoding for upstream chunk streams.
//!
//! Upstream servers frame streaming completions as `data:` lines. Network
//! reads split those lines arbitrarily, so the decoder buffers partial
//! input and only emits payloads for complete lines. Non-data fields and
//! comment lines are ignored.

/// Incremental `data:` line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    /// Fresh decoder with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read; returns the payload of every `data:` line
    /// completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_events() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.feed(b"data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(payloads, vec![r#"{"a":1}"#.to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn buffers_lines_split_across_reads() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"par").is_empty());
        assert!(decoder.feed(b"tial\":true}").is_empty());
        let payloads = decoder.feed(b"\n");
        assert_eq!(payloads, vec![r#"{"partial":true}"#.to_string()]);
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.feed(b"data: one\r\ndata: two\r\n");
        assert_eq!(payloads, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.feed(b": keep-alive\nevent: ping\ndata: kept\n");
        assert_eq!(payloads, vec!["kept".to_string()]);
    }
}

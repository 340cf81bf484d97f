//! Incremental decoding of `text/event-stream` response bodies.
//!
//! Provider streams arrive as arbitrary byte chunks. [`SseDecoder`] buffers
//! them until a line is complete and hands back the `data:` payload of each
//! finished event. Event names, ids and comments are dropped; both providers
//! carry everything they need in the JSON payload.

/// Payload OpenAI sends after the last chunk.
pub(crate) const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a body chunk and returns every event payload it completes.
    ///
    /// Lines are split on raw bytes, so a multi-byte character cut across
    /// two chunks is decoded intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                events.extend(self.data.take());
            } else if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match self.data.as_mut() {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_string()),
                }
            }
        }
        events
    }

    /// Flushes whatever the body ended without terminating.
    pub fn finish(&mut self) -> Vec<String> {
        self.push(b"\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .push(b"event: message_start\ndata: {\"a\":")
            .is_empty());
        assert!(decoder.push(b"1}\n").is_empty());
        assert_eq!(
            decoder.push(b"\ndata: {\"b\":2}\n\n"),
            vec!["{\"a\":1}", "{\"b\":2}"]
        );
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_crlf_comments_and_multiline_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\ndata: first\r\ndata: second\r\n\r\n");
        assert_eq!(events, vec!["first\nsecond"]);
    }

    #[test]
    fn test_multibyte_character_cut_between_chunks() {
        let text = "data: {\"text\":\"caf\u{e9}\"}\n\n".as_bytes();
        let cut = text.iter().position(|&b| b == 0xc3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&text[..cut]).is_empty());
        assert_eq!(decoder.push(&text[cut..]), vec!["{\"text\":\"caf\u{e9}\"}"]);
    }

    #[test]
    fn test_unterminated_event_flushed_on_finish() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![DONE_MARKER]);
        assert!(decoder.finish().is_empty());
    }
}

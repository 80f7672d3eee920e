//! Incremental decoder for `text/event-stream` bodies.
//!
//! Chunks arrive at arbitrary byte boundaries, possibly inside a multi-byte
//! character, so the decoder keeps the unfinished tail as bytes and only
//! decodes complete lines.

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` carry nothing the client uses.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = self.data.join("\n");
        self.data.clear();
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_frames() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: connection\ndata: {\"a\":1}\n\nevent: ping\ndata: {}\n\n");

        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: "connection".into(),
                    data: "{\"a\":1}".into()
                },
                SseFrame {
                    event: "ping".into(),
                    data: "{}".into()
                },
            ]
        );
    }

    #[test]
    fn frames_split_across_chunks_are_reassembled() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: message.n").is_empty());
        assert!(decoder.push(b"ew\ndata: {\"text\":").is_empty());
        let frames = decoder.push(b"\"hi\"}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message.new");
        assert_eq!(frames[0].data, "{\"text\":\"hi\"}");
    }

    #[test]
    fn space_after_colon_is_optional() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event:ping\r\ndata:{}\r\n\r\n");
        assert_eq!(frames[0].event, "ping");
        assert_eq!(frames[0].data, "{}");
    }

    #[test]
    fn comments_and_unknown_fields_are_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\nid: 7\nretry: 1000\ndata: one\ndata: two\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn event_without_data_is_dropped() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: ping\n\n").is_empty());
        // The dropped event name must not leak into the next frame.
        let frames = decoder.push(b"data: x\n\n");
        assert_eq!(frames[0].event, "message");
    }

    #[test]
    fn multibyte_text_split_mid_character_survives() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: \u{1f6ab} ended\n\n".as_bytes();
        let (head, tail) = bytes.split_at(8);

        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail)[0].data, "\u{1f6ab} ended");
    }
}

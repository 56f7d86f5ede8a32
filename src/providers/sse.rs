/// Reassembles server-sent-event `data:` payloads from arbitrary network
/// chunks. A line split across two chunks is held until its newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the complete `data:` payloads it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flushes a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let payloads = decoder.push(b"1}\n\ndata: [DONE]\n");

        assert_eq!(payloads, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn skips_non_data_lines() {
        let mut decoder = SseDecoder::new();

        let payloads =
            decoder.push(b": keep-alive\r\nevent: content_block_delta\r\ndata: {}\r\n\r\n");

        assert_eq!(payloads, vec!["{}".to_string()]);
    }

    #[test]
    fn multibyte_characters_survive_chunk_splits() {
        let text = "data: héllo\n".as_bytes();
        let (head, tail) = text.split_at(8);
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["héllo".to_string()]);
    }

    #[test]
    fn finish_returns_unterminated_line() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: tail");
        assert_eq!(decoder.finish(), Some("tail".to_string()));
        assert_eq!(decoder.finish(), None);
    }
}

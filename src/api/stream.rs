use crate::api::logging::emit_sse_parse_error;
use crate::types::GenerateContentResponse;
use anyhow::Result;

/// Incremental parser for the `alt=sse` streaming response. Chunks arrive at
/// arbitrary byte boundaries; events are `data: {json}` records separated by
/// a blank line. Each record yields the text fragments carried by its first
/// candidate.
#[derive(Default)]
pub struct StreamParser {
    buffer: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut fragments = Vec::new();
        let mut start = 0;

        while let Some(end) = find_record_end(&self.buffer[start..]) {
            let record_end = start + end;
            let record = &self.buffer[start..record_end];

            for line in record.lines() {
                let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }

                match serde_json::from_str::<GenerateContentResponse>(data) {
                    Ok(response) => {
                        let text = response.text();
                        if !text.is_empty() {
                            fragments.push(text);
                        }
                    }
                    Err(parse_error) => emit_sse_parse_error(data, &parse_error),
                }
            }

            start = skip_blank_separator(&self.buffer, record_end);
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(fragments)
    }

    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

// A record ends at the first blank line; tolerate \r\n framing.
fn find_record_end(buffer: &str) -> Option<usize> {
    let lf = buffer.find("\n\n");
    let crlf = buffer.find("\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn skip_blank_separator(buffer: &str, mut index: usize) -> usize {
    let bytes = buffer.as_bytes();
    while index < bytes.len() && (bytes[index] == b'\n' || bytes[index] == b'\r') {
        index += 1;
    }
    index
}

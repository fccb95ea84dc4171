//! Incremental Server-Sent Events decoding over raw HTTP body chunks.

/// Buffers partial lines and incomplete UTF-8 sequences between chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    line: String,
}

impl SseDecoder {
    /// Feed one body chunk; returns the `data:` payloads of every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        // Move the maximal valid UTF-8 prefix into the line buffer; keep an incomplete tail.
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                self.line.push_str(text);
                self.pending.clear();
            }
            Err(err) => {
                let n = err.valid_up_to();
                if err.error_len().is_some() {
                    // Invalid bytes, not just a split sequence; replace and move on.
                    self.line.push_str(&String::from_utf8_lossy(&self.pending));
                    self.pending.clear();
                } else if n > 0 {
                    self.line
                        .push_str(&String::from_utf8_lossy(&self.pending[..n]));
                    self.pending.drain(..n);
                }
            }
        }

        let mut out = Vec::new();
        while let Some(end) = self.line.find('\n') {
            let raw: String = self.line.drain(..=end).collect();
            let line = raw.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                out.push(data.trim_start().to_string());
            }
        }
        out
    }
}

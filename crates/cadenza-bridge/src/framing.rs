//! Newline framing for the response stream.

/// Splits an incoming byte stream into complete lines.
///
/// Bytes append to an internal buffer; `feed` returns every complete line and
/// holds back the trailing partial line until its newline arrives. Lines that
/// are empty (or whitespace only) are skipped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let mut line: String = self.buf.drain(..=pos).collect();
            line.pop(); // trailing '\n'
            if line.ends_with('\r') {
                line.pop();
            }
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Bytes currently held back waiting for a newline.
    pub fn pending(&self) -> &str {
        &self.buf
    }
}

//! Response sentence parser
//!
//! Accumulates raw bytes read from the modem link and splits them into
//! terminator-delimited sentences. Partial lines are preserved across reads
//! so a sentence split over several reads is reassembled transparently.

/// Splits a modem byte stream into line-delimited sentences.
///
/// Sentences are delimited by `\n`; a `\r` immediately before the delimiter
/// is stripped, as are blank sentences (the CRLF padding modems emit around
/// answers). `clear` drops all buffered state, leaving the parser as new.
#[derive(Debug, Default)]
pub struct SentenceParser {
    buffer: Vec<u8>,
}

impl SentenceParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Append newly read bytes to the accumulator.
    pub fn receive(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract the next complete sentence, if any.
    ///
    /// Returns `None` while no full sentence is buffered; partial data is
    /// kept for the next `receive`.
    pub fn extract_sentence(&mut self) -> Option<String> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let mut end = line.len() - 1;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }
            if end == 0 {
                continue;
            }
            return Some(String::from_utf8_lossy(&line[..end]).into_owned());
        }
        None
    }

    /// Number of bytes buffered without a terminator yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered data. Used when the transport link is torn down.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

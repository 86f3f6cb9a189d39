use crate::domain::model::Record;

pub const DEFAULT_TERMINATOR: u8 = b'\n';

/// Splits a raw byte stream into records and frames outbound text.
///
/// Bytes after the last terminator are kept until more data arrives or the
/// stream ends. Text is decoded lossily; the relay treats it as opaque.
#[derive(Debug, Clone)]
pub struct LineCodec {
    terminator: u8,
    pending: Vec<u8>,
}

impl LineCodec {
    pub fn new(terminator: u8) -> Self {
        Self {
            terminator,
            pending: Vec::new(),
        }
    }

    pub fn terminator(&self) -> u8 {
        self.terminator
    }

    /// Feeds bytes and returns every record completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Record> {
        let mut records = Vec::new();

        for chunk in bytes.split_inclusive(|&b| b == self.terminator) {
            if chunk.last() == Some(&self.terminator) {
                self.pending.extend_from_slice(&chunk[..chunk.len() - 1]);
                let line = std::mem::take(&mut self.pending);
                records.push(Record::new(String::from_utf8_lossy(&line).into_owned()));
            } else {
                self.pending.extend_from_slice(chunk);
            }
        }

        records
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Ends the stream, returning the unterminated tail if there is one.
    pub fn finish(&mut self) -> Option<Record> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(Record::new(String::from_utf8_lossy(&line).into_owned()))
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(self.terminator);
        frame
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINATOR)
    }
}

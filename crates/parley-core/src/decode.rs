//! Incremental UTF-8 decoding for chunked response bodies.
//!
//! HTTP chunk boundaries fall anywhere, including inside a multi-byte code
//! point. The decoder buffers a trailing incomplete sequence and prepends it
//! to the next chunk so fragments never contain replacement characters and
//! no bytes are dropped.

use crate::error::Error;

#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next raw buffer; returns the decodable prefix (possibly
    /// empty). Invalid bytes in the interior of the stream are an error.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<String, Error> {
        if self.pending.is_empty() && bytes.is_empty() {
            return Ok(String::new());
        }
        self.pending.extend_from_slice(bytes);

        match std::str::from_utf8(&self.pending) {
            Ok(_) => {
                let buf = std::mem::take(&mut self.pending);
                // Checked valid just above.
                Ok(String::from_utf8(buf).map_err(|e| Error::decode(e.to_string()))?)
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete trailing sequence: hold it back for the next chunk.
                let valid = e.valid_up_to();
                let rest = self.pending.split_off(valid);
                let buf = std::mem::replace(&mut self.pending, rest);
                String::from_utf8(buf).map_err(|e| Error::decode(e.to_string()))
            }
            Err(e) => {
                self.pending.clear();
                Err(Error::decode(format!("invalid UTF-8 in stream: {e}")))
            }
        }
    }

    /// Drain the remainder at end of stream.
    ///
    /// A non-empty leftover is an incomplete sequence the stream never
    /// finished; that is a decoding error, not silent data loss.
    pub fn finish(&mut self) -> Result<Option<String>, Error> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let buf = std::mem::take(&mut self.pending);
        match String::from_utf8(buf) {
            Ok(s) => Ok(Some(s)),
            Err(e) => Err(Error::decode(format!(
                "stream ended mid code point ({} byte(s) undecodable)",
                e.as_bytes().len()
            ))),
        }
    }

    /// Bytes currently held back waiting for the rest of a code point.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

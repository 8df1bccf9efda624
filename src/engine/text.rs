//! Incremental byte-to-text assembly.
//!
//! Token pieces can end halfway through a UTF-8 sequence. The assembler
//! holds incomplete trailing bytes back until the next piece completes
//! them, so callers only ever see whole characters.

use encoding_rs::{Decoder, UTF_8};

/// Streaming UTF-8 decoder accumulating the text seen so far.
pub struct TextAssembler {
    decoder: Decoder,
    text: String,
    finished: bool,
}

impl TextAssembler {
    pub fn new() -> Self {
        Self {
            decoder: UTF_8.new_decoder_without_bom_handling(),
            text: String::new(),
            finished: false,
        }
    }

    /// Feed raw bytes; returns the text completed by this call.
    ///
    /// Malformed sequences become U+FFFD.
    pub fn push(&mut self, bytes: &[u8]) -> &str {
        self.decode(bytes, false)
    }

    /// Flush held-back bytes as replacement characters. Further pushes are ignored.
    pub fn finish(&mut self) -> &str {
        if self.finished {
            return "";
        }
        self.finished = true;
        self.decode(&[], true)
    }

    /// Everything decoded so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode(&mut self, bytes: &[u8], last: bool) -> &str {
        let start = self.text.len();
        if self.finished && !last {
            return &self.text[start..];
        }
        if let Some(needed) = self.decoder.max_utf8_buffer_length(bytes.len()) {
            self.text.reserve(needed);
        }
        // Capacity was reserved for the worst case, so the whole input is consumed.
        let (_result, _read, _replaced) = self.decoder.decode_to_string(bytes, &mut self.text, last);
        &self.text[start..]
    }
}

impl Default for TextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextAssembler")
            .field("text", &self.text)
            .field("finished", &self.finished)
            .finish()
    }
}

//! Incremental UTF-8 decoding for chunked byte streams.
//!
//! Render output is produced as byte chunks; consumers that want text back
//! (string collection, logging, tests) feed those chunks through a
//! [`Utf8Decoder`]. A multi-byte character split across two chunks is
//! reassembled, and invalid sequences become U+FFFD instead of aborting.

/// Streaming decoder that carries an incomplete UTF-8 suffix between pushes.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    text: String,
    // Incomplete trailing sequence from the previous push (at most 3 bytes).
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            carry: Vec::new(),
        }
    }

    /// Decode `bytes`, appending complete characters to the buffered text.
    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if self.carry.is_empty() {
            decode_into(&mut self.text, &mut self.carry, bytes);
            return;
        }

        // Complete the carried sequence with just enough prefix bytes, then
        // decode the rest of the chunk in place.
        let mut remaining = bytes;
        while !self.carry.is_empty() && !remaining.is_empty() {
            let expected = sequence_len(self.carry[0]);
            if expected == 0 {
                self.text.push('\u{FFFD}');
                self.carry.clear();
                break;
            }

            let needed = expected.saturating_sub(self.carry.len());
            if needed == 0 {
                let pending = std::mem::take(&mut self.carry);
                decode_into(&mut self.text, &mut self.carry, &pending);
                continue;
            }
            if remaining.len() < needed {
                self.carry.extend_from_slice(remaining);
                return;
            }

            let mut scratch = [0u8; 8];
            let carried = self.carry.len();
            scratch[..carried].copy_from_slice(&self.carry);
            scratch[carried..carried + needed].copy_from_slice(&remaining[..needed]);
            self.carry.clear();
            decode_into(&mut self.text, &mut self.carry, &scratch[..carried + needed]);
            remaining = &remaining[needed..];
        }

        if !remaining.is_empty() {
            decode_into(&mut self.text, &mut self.carry, remaining);
        }
    }

    /// Bytes still waiting for the rest of their character.
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Flush any carried suffix lossily and return the decoded text.
    pub fn finish(mut self) -> String {
        if !self.carry.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.carry));
        }
        self.text
    }
}

/// One-shot lossy decode; invalid sequences become U+FFFD.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut decoder = Utf8Decoder::with_capacity(bytes.len());
    decoder.push(bytes);
    decoder.finish()
}

fn sequence_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

fn decode_into(text: &mut String, carry: &mut Vec<u8>, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                text.push_str(valid);
                break;
            }
            Err(err) => {
                let (valid, rest) = bytes.split_at(err.valid_up_to());
                // SAFETY: `valid_up_to` marks the end of a verified UTF-8 prefix.
                text.push_str(unsafe { std::str::from_utf8_unchecked(valid) });
                match err.error_len() {
                    Some(len) => {
                        text.push('\u{FFFD}');
                        bytes = &rest[len..];
                    }
                    None => {
                        carry.extend_from_slice(rest);
                        break;
                    }
                }
            }
        }
    }
}

//! Incremental UTF-8 decoding for streamed response bodies
//!
//! HTTP chunk boundaries are arbitrary: a multi-byte codepoint can be split
//! across two chunks. [`Utf8StreamDecoder`] carries the trailing bytes of an
//! incomplete codepoint from one chunk to the next instead of emitting
//! replacement characters mid-stream. Only genuinely invalid sequences are
//! replaced with U+FFFD.

/// Incremental UTF-8 decoder with carry-over for split codepoints.
///
/// # Examples
///
/// ```
/// use datachat::stream::Utf8StreamDecoder;
///
/// let mut decoder = Utf8StreamDecoder::new();
/// // "é" is 0xC3 0xA9 -- split across two chunks
/// assert_eq!(decoder.decode(&[0xC3]), "");
/// assert_eq!(decoder.decode(&[0xA9]), "é");
/// assert_eq!(decoder.finish(), "");
/// ```
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    /// Trailing bytes of an incomplete codepoint, at most 3 bytes.
    carry: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Create a decoder with no pending state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, prepending any carried bytes from the previous
    /// chunk.
    ///
    /// Invalid byte sequences in the interior of the input are replaced
    /// with U+FFFD and decoding continues. An incomplete codepoint at the
    /// end of the input is held back for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut input = bytes.as_slice();

        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    // `valid_up_to` guarantees this slice is well-formed.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match err.error_len() {
                        // Invalid sequence in the interior: replace and skip.
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Incomplete codepoint at the end: carry it over.
                        None => {
                            self.carry = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush residual decode state at stream end.
    ///
    /// A dangling partial codepoint becomes a single replacement character.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            String::new()
        } else {
            self.carry.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// True if bytes from a previous chunk are pending completion.
    pub fn has_pending(&self) -> bool {
        !self.carry.is_empty()
    }
}

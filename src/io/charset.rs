//! Character sets for handle reads and encoding layers.

use encoding_rs::{Decoder, Encoding, UTF_8};

use crate::error::{IoError, IoResult};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Repr {
    /// Identity: each byte is one code point. Covers latin-1 requests too.
    Bytes,
    Ext(&'static Encoding),
}

/// A charset a handle can decode from or account against.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset(Repr);

impl Charset {
    /// Byte-transparent charset: reads map bytes 1:1 to code points.
    pub const fn bytes() -> Self {
        Self(Repr::Bytes)
    }

    /// UTF-8.
    pub fn utf8() -> Self {
        Self(Repr::Ext(UTF_8))
    }

    /// Resolve a charset label, case-insensitively.
    pub fn named(label: &str) -> IoResult<Self> {
        let l = label.trim();
        if matches!(
            l.to_ascii_lowercase().as_str(),
            "bytes" | "binary" | "latin1" | "latin-1" | "iso-8859-1" | "iso_8859_1"
        ) {
            return Ok(Self::bytes());
        }
        Encoding::for_label(l.as_bytes())
            .map(|e| Self(Repr::Ext(e)))
            .ok_or_else(|| IoError::UnsupportedCharset(label.to_string()))
    }

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self.0 {
            Repr::Bytes => "latin-1",
            Repr::Ext(e) => e.name(),
        }
    }

    /// Width of one code point in this charset, for byte accounting of
    /// pushed-back characters.
    pub(crate) fn encoded_len(&self, c: char) -> usize {
        match self.0 {
            Repr::Bytes => 1,
            Repr::Ext(e) => match e.name() {
                "UTF-16LE" | "UTF-16BE" => {
                    if (c as u32) >= 0x10000 {
                        4
                    } else {
                        2
                    }
                }
                "UTF-8" => c.len_utf8(),
                _ => 1,
            },
        }
    }
}

impl std::fmt::Debug for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

/// Streaming decoder state a handle keeps across reads, so a multi-byte
/// sequence cut by the read boundary survives to the next call.
#[derive(Default)]
pub(crate) struct DecodeState {
    current: Option<(Charset, Decoder)>,
}

impl DecodeState {
    /// Decode one chunk. The decoder persists between calls for the same
    /// charset; switching charsets mid-stream drops the old state.
    pub fn decode(&mut self, charset: Charset, bytes: &[u8]) -> String {
        let enc = match charset.0 {
            Repr::Bytes => return bytes.iter().map(|&b| b as char).collect(),
            Repr::Ext(e) => e,
        };

        if self.current.as_ref().map(|(c, _)| *c != charset).unwrap_or(true) {
            self.current = Some((charset, enc.new_decoder()));
        }
        let (_, decoder) = self.current.as_mut().expect("decoder installed");

        let mut out = String::with_capacity(
            decoder
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len() * 4),
        );
        // Capacity covers the whole chunk, so one call consumes it all;
        // malformed input becomes U+FFFD, a trailing partial sequence stays
        // in the decoder.
        let _ = decoder.decode_to_string(bytes, &mut out, false);
        out
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_resolve_case_insensitively() {
        assert_eq!(Charset::named("utf-8").unwrap(), Charset::utf8());
        assert_eq!(Charset::named("UTF-8").unwrap(), Charset::utf8());
        assert_eq!(Charset::named("Latin-1").unwrap(), Charset::bytes());
        assert!(Charset::named("no-such-charset").is_err());
    }

    #[test]
    fn split_multibyte_sequence_survives_chunking() {
        let mut dec = DecodeState::default();
        let bytes = "héllo".as_bytes();
        // Cut inside the two-byte é.
        let mut out = dec.decode(Charset::utf8(), &bytes[..2]);
        out.push_str(&dec.decode(Charset::utf8(), &bytes[2..]));
        assert_eq!(out, "héllo");
    }
}

//! Stackable I/O transformations and the `binmode` spec parser.
//!
//! A layer is a pair of string-to-string transformations. On input the
//! leftmost layer sees raw bytes first (as a byte-string: one code point per
//! byte); on output it sees the user's characters first. State that spans
//! calls — a CR held at a buffer boundary, a partial multi-byte sequence —
//! lives inside the layer instance and is dropped by [`IoLayer::reset`].

use encoding_rs::{Decoder, Encoder, EncoderResult, Encoding};

use crate::error::{IoError, IoResult};

/// One element of a handle's layer stack.
pub trait IoLayer {
    /// Transform data travelling from the backing handle to the reader.
    fn process_input(&mut self, data: &str) -> String;

    /// Transform data travelling from the writer to the backing handle.
    fn process_output(&mut self, data: &str) -> String;

    /// Drop any state held across calls. Invoked on `seek` and `binmode`.
    fn reset(&mut self);

    /// Flush state held for a next chunk that will never come. Called when
    /// the backing stream ends.
    fn finish_input(&mut self) -> String {
        String::new()
    }
}

/// Parse a `binmode` layer specification. The whole spec is validated before
/// anything is instantiated, so an unknown layer leaves the caller's stack
/// untouched.
pub(crate) fn parse_spec(spec: &str) -> IoResult<Vec<Box<dyn IoLayer>>> {
    if !spec.starts_with(':') {
        return Err(IoError::UnknownLayer(spec.to_string()));
    }

    let mut layers: Vec<Box<dyn IoLayer>> = vec![];
    for token in spec.split(':').skip(1) {
        let token = token.trim();
        match token {
            // Identity layers discard whatever came before them.
            "raw" | "bytes" | "unix" => layers.clear(),
            "crlf" => layers.push(Box::new(CrlfLayer::new())),
            "utf8" => layers.push(Box::new(EncodingLayer::utf8())),
            _ => match token
                .strip_prefix("encoding(")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                Some(charset) => layers.push(Box::new(EncodingLayer::new(charset)?)),
                None => return Err(IoError::UnknownLayer(token.to_string())),
            },
        }
    }
    Ok(layers)
}

/// Pack a byte-string (every code point ≤ 0xFF) into bytes.
pub(crate) fn pack_bytes(s: &str) -> IoResult<Vec<u8>> {
    s.chars()
        .map(|c| u8::try_from(c as u32).map_err(|_| IoError::InvalidCodepoint(c as u32)))
        .collect()
}

/// Present bytes as a byte-string.
pub(crate) fn unpack_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Octets of a string as an unlayered handle writes them: identity for
/// byte-strings, UTF-8 for anything wider.
pub fn octets(s: &str) -> Vec<u8> {
    if s.chars().all(|c| (c as u32) <= 0xFF) {
        s.chars().map(|c| c as u8).collect()
    } else {
        s.as_bytes().to_vec()
    }
}

/// Line-ending conversion: CRLF → LF on input, LF → CRLF on output.
#[derive(Debug, Default)]
pub struct CrlfLayer {
    // A CR ending one buffer may pair with an LF starting the next.
    last_was_cr: bool,
}

impl CrlfLayer {
    /// Fresh layer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IoLayer for CrlfLayer {
    fn process_input(&mut self, data: &str) -> String {
        let mut out = String::with_capacity(data.len());
        let mut chars = data.chars().peekable();

        if self.last_was_cr {
            self.last_was_cr = false;
            if chars.peek() == Some(&'\n') {
                chars.next();
                out.push('\n');
            } else {
                out.push('\r');
            }
        }

        while let Some(c) = chars.next() {
            if c == '\r' {
                match chars.peek() {
                    Some('\n') => {
                        chars.next();
                        out.push('\n');
                    }
                    Some(_) => out.push('\r'),
                    None => self.last_was_cr = true,
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    fn process_output(&mut self, data: &str) -> String {
        let mut out = String::with_capacity(data.len());
        for c in data.chars() {
            if c == '\n' {
                out.push('\r');
            }
            out.push(c);
        }
        out
    }

    fn reset(&mut self) {
        self.last_was_cr = false;
    }

    fn finish_input(&mut self) -> String {
        if std::mem::take(&mut self.last_was_cr) {
            "\r".to_string()
        } else {
            String::new()
        }
    }
}

enum Codec {
    /// Bytes are code points; unmappable output becomes `?`.
    Latin1,
    /// UTF-16, hand-coded: the Encoding Standard (and therefore
    /// `encoding_rs`) provides no UTF-16 encoder.
    Utf16 {
        /// Endianness fixed by the label, `None` for plain "UTF-16" which
        /// sniffs a BOM and defaults to big-endian.
        preset: Option<bool>,
        /// Whether output starts with a BOM (plain "UTF-16" only).
        bom_out: bool,
        /// Current input endianness once decided.
        big: Option<bool>,
        wrote_bom: bool,
        pending: Vec<u8>,
    },
    /// Any other charset, via `encoding_rs` streaming coders.
    Ext {
        enc: &'static Encoding,
        decoder: Decoder,
        encoder: Encoder,
    },
}

/// Transcoding layer: decodes input bytes into characters, encodes output
/// characters into bytes. Partial multi-byte sequences are buffered across
/// calls; malformed input becomes U+FFFD, unmappable output the charset's
/// substitution byte.
pub struct EncodingLayer {
    codec: Codec,
}

impl EncodingLayer {
    /// Layer for a named charset.
    pub fn new(label: &str) -> IoResult<Self> {
        let lower = label.trim().to_ascii_lowercase();
        let codec = match lower.as_str() {
            "latin1" | "latin-1" | "iso-8859-1" | "iso_8859_1" | "bytes" | "binary" => {
                Codec::Latin1
            }
            "utf-16" | "utf16" => Codec::Utf16 {
                preset: None,
                bom_out: true,
                big: None,
                wrote_bom: false,
                pending: vec![],
            },
            "utf-16le" | "utf16le" => Codec::Utf16 {
                preset: Some(false),
                bom_out: false,
                big: Some(false),
                wrote_bom: false,
                pending: vec![],
            },
            "utf-16be" | "utf16be" => Codec::Utf16 {
                preset: Some(true),
                bom_out: false,
                big: Some(true),
                wrote_bom: false,
                pending: vec![],
            },
            _ => {
                let enc = Encoding::for_label(label.trim().as_bytes())
                    .ok_or_else(|| IoError::UnsupportedCharset(label.to_string()))?;
                Codec::Ext {
                    enc,
                    decoder: enc.new_decoder(),
                    encoder: enc.new_encoder(),
                }
            }
        };
        Ok(Self { codec })
    }

    /// The `:utf8` shorthand.
    pub fn utf8() -> Self {
        let enc = encoding_rs::UTF_8;
        Self {
            codec: Codec::Ext {
                enc,
                decoder: enc.new_decoder(),
                encoder: enc.new_encoder(),
            },
        }
    }
}

impl IoLayer for EncodingLayer {
    fn process_input(&mut self, data: &str) -> String {
        let bytes = octets(data);
        match &mut self.codec {
            Codec::Latin1 => data.to_string(),
            Codec::Utf16 {
                preset,
                big,
                pending,
                ..
            } => {
                pending.extend_from_slice(&bytes);
                decode_utf16_pending(preset, big, pending, false)
            }
            Codec::Ext { decoder, .. } => decode_ext(decoder, &bytes),
        }
    }

    fn process_output(&mut self, data: &str) -> String {
        match &mut self.codec {
            Codec::Latin1 => data
                .chars()
                .map(|c| if (c as u32) <= 0xFF { c } else { '?' })
                .collect(),
            Codec::Utf16 {
                preset,
                bom_out,
                wrote_bom,
                ..
            } => {
                let big = preset.unwrap_or(true);
                let mut out = Vec::with_capacity(data.len() * 2 + 2);
                if *bom_out && !*wrote_bom {
                    *wrote_bom = true;
                    push_u16(&mut out, 0xFEFF, big);
                }
                for unit in data.encode_utf16() {
                    push_u16(&mut out, unit, big);
                }
                unpack_bytes(&out)
            }
            Codec::Ext { encoder, .. } => unpack_bytes(&encode_ext(encoder, data)),
        }
    }

    fn reset(&mut self) {
        match &mut self.codec {
            Codec::Latin1 => (),
            Codec::Utf16 {
                preset,
                big,
                wrote_bom,
                pending,
                ..
            } => {
                *big = *preset;
                *wrote_bom = false;
                pending.clear();
            }
            Codec::Ext {
                enc,
                decoder,
                encoder,
            } => {
                *decoder = enc.new_decoder();
                *encoder = enc.new_encoder();
            }
        }
    }

    fn finish_input(&mut self) -> String {
        match &mut self.codec {
            Codec::Latin1 => String::new(),
            Codec::Utf16 {
                preset,
                big,
                pending,
                ..
            } => decode_utf16_pending(preset, big, pending, true),
            Codec::Ext { enc, decoder, .. } => {
                let mut out = String::with_capacity(4);
                let _ = decoder.decode_to_string(&[], &mut out, true);
                *decoder = enc.new_decoder();
                out
            }
        }
    }
}

fn push_u16(out: &mut Vec<u8>, unit: u16, big: bool) {
    if big {
        out.extend_from_slice(&unit.to_be_bytes());
    } else {
        out.extend_from_slice(&unit.to_le_bytes());
    }
}

fn decode_utf16_pending(
    preset: &Option<bool>,
    big: &mut Option<bool>,
    pending: &mut Vec<u8>,
    last: bool,
) -> String {
    // BOM sniffing happens once, on the first two bytes of the stream.
    if big.is_none() && pending.len() >= 2 {
        *big = match (pending[0], pending[1]) {
            (0xFE, 0xFF) => {
                pending.drain(..2);
                Some(true)
            }
            (0xFF, 0xFE) => {
                pending.drain(..2);
                Some(false)
            }
            _ => Some(preset.unwrap_or(true)),
        };
    }

    let Some(big_endian) = *big else {
        if last && !pending.is_empty() {
            pending.clear();
            return char::REPLACEMENT_CHARACTER.to_string();
        }
        return String::new();
    };

    let mut units: Vec<u16> = pending
        .chunks_exact(2)
        .map(|p| {
            if big_endian {
                u16::from_be_bytes([p[0], p[1]])
            } else {
                u16::from_le_bytes([p[0], p[1]])
            }
        })
        .collect();
    let mut keep = pending.len() % 2;

    // A trailing high surrogate may pair with the next chunk.
    if !last {
        if let Some(&unit) = units.last() {
            if (0xD800..0xDC00).contains(&unit) {
                units.pop();
                keep += 2;
            }
        }
    }

    let consumed = pending.len() - keep;
    pending.drain(..consumed);
    if last && !pending.is_empty() {
        pending.clear();
        let mut out: String = char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        out.push(char::REPLACEMENT_CHARACTER);
        return out;
    }

    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn decode_ext(decoder: &mut Decoder, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(
        decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 4),
    );
    let _ = decoder.decode_to_string(bytes, &mut out, false);
    out
}

fn encode_ext(encoder: &mut Encoder, data: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut src = data;
    loop {
        let needed = encoder
            .max_buffer_length_from_utf8_without_replacement(src.len())
            .unwrap_or(src.len() * 4)
            .max(4);
        let start = out.len();
        out.resize(start + needed, 0);
        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(src, &mut out[start..], false);
        out.truncate(start + written);
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => continue,
            EncoderResult::Unmappable(_) => out.push(b'?'),
        }
    }
    out
}

//! The layered facade: a uniform handle view wrapping every read and write
//! in the layer pipeline.

use tracing::debug;

use crate::consts::{READ_BYTE_FACTOR, READ_CHUNK};
use crate::error::IoResult;

use super::charset::Charset;
use super::handle::{IoHandle, UngetBuffer, Whence};
use super::layer::{self, pack_bytes, unpack_bytes, IoLayer};

/// A backing handle plus an ordered layer stack and an unget buffer.
///
/// This is the public surface of the I/O subsystem: script-level filehandles
/// are layered handles, whatever shape sits underneath.
pub struct LayeredHandle {
    inner: Box<dyn IoHandle>,
    layers: Vec<Box<dyn IoLayer>>,
    unget: UngetBuffer,
}

impl LayeredHandle {
    /// Wrap a backing handle with an empty layer stack.
    pub fn new(inner: Box<dyn IoHandle>) -> Self {
        Self {
            inner,
            layers: vec![],
            unget: UngetBuffer::default(),
        }
    }

    /// Wrap and immediately apply a layer spec.
    pub fn with_layers(inner: Box<dyn IoHandle>, spec: &str) -> IoResult<Self> {
        let mut handle = Self::new(inner);
        handle.binmode(spec)?;
        Ok(handle)
    }

    /// Apply a layer specification, replacing the current stack entirely.
    /// The spec is parsed before anything is touched: an unknown layer name
    /// fails and leaves the stack unchanged.
    pub fn binmode(&mut self, spec: &str) -> IoResult<()> {
        let new_layers = note(layer::parse_spec(spec))?;
        for l in &mut self.layers {
            l.reset();
        }
        self.layers = new_layers;
        debug!(spec, layers = self.layers.len(), "binmode applied");
        Ok(())
    }

    /// Number of active layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Write characters through the output pipeline.
    pub fn write_str(&mut self, data: &str) -> IoResult<usize> {
        if self.layers.is_empty() {
            return note(self.inner.write(&layer::octets(data)));
        }

        let mut out = data.to_string();
        for l in &mut self.layers {
            out = l.process_output(&out);
        }
        // The pipeline's product is a byte-string: one byte per code point.
        let bytes = note(pack_bytes(&out))?;
        note(self.inner.write(&bytes))
    }

    /// The backing handle.
    pub fn inner(&self) -> &dyn IoHandle {
        self.inner.as_ref()
    }

    fn read_layered(&mut self, max_chars: usize, _charset: Charset) -> IoResult<String> {
        let mut out = String::new();
        let mut chars = 0;

        while chars < max_chars {
            match self.unget.pop() {
                Some(c) => {
                    out.push(c);
                    chars += 1;
                }
                None => break,
            }
        }

        let byte_cap = max_chars.saturating_mul(READ_BYTE_FACTOR);
        let mut consumed = 0;

        while chars < max_chars && consumed < byte_cap {
            let want = READ_CHUNK.min(byte_cap - consumed);
            let chunk = self.inner.read(want, Charset::bytes())?;

            if chunk.is_empty() {
                // Stream end: layers flush whatever they were holding for a
                // next chunk (a dangling CR, a partial sequence).
                let mut tail = String::new();
                for i in 0..self.layers.len() {
                    let mut carry = self.layers[i].finish_input();
                    for later in self.layers[i + 1..].iter_mut() {
                        carry = later.process_input(&carry);
                    }
                    tail.push_str(&carry);
                }
                for c in tail.chars() {
                    if chars < max_chars {
                        out.push(c);
                        chars += 1;
                    }
                }
                break;
            }

            consumed += chunk.chars().count();
            let mut data = chunk;
            for l in &mut self.layers {
                data = l.process_input(&data);
            }
            // Characters beyond the request are dropped; layers buffer
            // partial sequences themselves, not us.
            for c in data.chars() {
                if chars < max_chars {
                    out.push(c);
                    chars += 1;
                }
            }
        }

        Ok(out)
    }
}

impl IoHandle for LayeredHandle {
    /// With no layers: up to `n` bytes decoded through `charset`, pushed-back
    /// code points first (accounted at their encoded width). With layers: a
    /// character-based read of up to `n` characters, consuming at most
    /// `READ_BYTE_FACTOR × n` backing bytes.
    fn read(&mut self, n: usize, charset: Charset) -> IoResult<String> {
        if !self.layers.is_empty() {
            let r = self.read_layered(n, charset);
            return note(r);
        }

        let mut out = String::new();
        let mut budget = n;
        self.unget.drain(&mut out, &mut budget, charset);

        if budget > 0 {
            let rest = note(self.inner.read(budget, charset))?;
            out.push_str(&rest);
        }
        Ok(out)
    }

    fn write(&mut self, bytes: &[u8]) -> IoResult<usize> {
        if self.layers.is_empty() {
            return note(self.inner.write(bytes));
        }
        self.write_str(&unpack_bytes(bytes))
    }

    fn flush(&mut self) -> IoResult<()> {
        // Layers buffer no output in this design; flushing is the backing
        // handle's business.
        note(self.inner.flush())
    }

    fn close(&mut self) -> IoResult<()> {
        let _ = self.inner.flush();
        for l in &mut self.layers {
            l.reset();
        }
        note(self.inner.close())
    }

    fn eof(&self) -> bool {
        self.unget.is_empty() && self.inner.eof()
    }

    fn tell(&self) -> i64 {
        self.inner.tell()
    }

    fn seek(&mut self, pos: i64, whence: Whence) -> IoResult<u64> {
        for l in &mut self.layers {
            l.reset();
        }
        self.unget.clear();
        note(self.inner.seek(pos, whence))
    }

    fn truncate(&mut self, len: u64) -> IoResult<()> {
        note(self.inner.truncate(len))
    }

    fn fileno(&self) -> Option<i32> {
        self.inner.fileno()
    }

    fn ungetc(&mut self, cp: i32) -> IoResult<()> {
        note(self.unget.push(cp))
    }
}

/// Record a failure in the process-wide last-error slot on the way out.
fn note<T>(r: IoResult<T>) -> IoResult<T> {
    if let Err(e) = &r {
        super::set_last_error(e);
    }
    r
}

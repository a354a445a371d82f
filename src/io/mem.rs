//! Scalar-backed in-memory file.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{IoError, IoResult};

use super::charset::{Charset, DecodeState};
use super::handle::{IoHandle, UngetBuffer, Whence};

/// A byte-string "file" backed by a shared mutable buffer, the way
/// `open($fh, '<', \$scalar)` binds a handle to a scalar. Supports full
/// random access on every whence plus truncate.
pub struct ScalarFile {
    buf: Rc<RefCell<Vec<u8>>>,
    pos: usize,
    eof: bool,
    closed: bool,
    dec: DecodeState,
    unget: UngetBuffer,
}

impl ScalarFile {
    /// Fresh, empty buffer.
    pub fn new() -> Self {
        Self::shared(Rc::new(RefCell::new(vec![])))
    }

    /// Handle over existing contents.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::shared(Rc::new(RefCell::new(bytes)))
    }

    /// Handle over a buffer the caller keeps a reference to.
    pub fn shared(buf: Rc<RefCell<Vec<u8>>>) -> Self {
        Self {
            buf,
            pos: 0,
            eof: false,
            closed: false,
            dec: DecodeState::default(),
            unget: UngetBuffer::default(),
        }
    }

    /// The backing buffer.
    pub fn buffer(&self) -> Rc<RefCell<Vec<u8>>> {
        self.buf.clone()
    }

    fn ensure_open(&self) -> IoResult<()> {
        if self.closed {
            Err(IoError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for ScalarFile {
    fn default() -> Self {
        Self::new()
    }
}

impl IoHandle for ScalarFile {
    fn read(&mut self, n: usize, charset: Charset) -> IoResult<String> {
        self.ensure_open()?;

        let mut out = String::new();
        let mut budget = n;
        self.unget.drain(&mut out, &mut budget, charset);

        if budget > 0 {
            let buf = self.buf.borrow();
            let end = (self.pos + budget).min(buf.len());
            let slice = &buf[self.pos.min(buf.len())..end];
            let got = slice.len();
            if got < budget {
                self.eof = true;
            }
            let text = self.dec.decode(charset, slice);
            drop(buf);
            self.pos += got;
            out.push_str(&text);
        }

        Ok(out)
    }

    fn write(&mut self, bytes: &[u8]) -> IoResult<usize> {
        self.ensure_open()?;
        let mut buf = self.buf.borrow_mut();
        if self.pos > buf.len() {
            // Seeking past the end and writing zero-fills the gap.
            buf.resize(self.pos, 0);
        }
        let overlap = (buf.len() - self.pos).min(bytes.len());
        buf[self.pos..self.pos + overlap].copy_from_slice(&bytes[..overlap]);
        buf.extend_from_slice(&bytes[overlap..]);
        drop(buf);
        self.pos += bytes.len();
        Ok(bytes.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.ensure_open()
    }

    fn close(&mut self) -> IoResult<()> {
        self.closed = true;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn tell(&self) -> i64 {
        if self.closed {
            -1
        } else {
            self.pos as i64
        }
    }

    fn seek(&mut self, pos: i64, whence: Whence) -> IoResult<u64> {
        self.ensure_open()?;
        let len = self.buf.borrow().len() as i64;
        let target = match whence {
            Whence::Set => pos,
            Whence::Cur => self.pos as i64 + pos,
            Whence::End => len + pos,
        };
        if target < 0 {
            return Err(IoError::Os(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start",
            )));
        }
        self.pos = target as usize;
        self.eof = false;
        self.dec.reset();
        self.unget.clear();
        Ok(self.pos as u64)
    }

    fn truncate(&mut self, len: u64) -> IoResult<()> {
        self.ensure_open()?;
        self.buf.borrow_mut().resize(len as usize, 0);
        Ok(())
    }

    fn ungetc(&mut self, cp: i32) -> IoResult<()> {
        self.ensure_open()?;
        self.unget.push(cp)
    }
}

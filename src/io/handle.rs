//! The handle contract every backing shape provides, the shared push-back
//! buffer, and the closed-handle sentinel.

use std::collections::VecDeque;

use crate::error::{IoError, IoResult};

use super::charset::Charset;

/// Seek origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the stream.
    Set,
    /// Relative to the current position.
    Cur,
    /// Relative to the end.
    End,
}

/// Uniform operations over every backing handle.
///
/// Shapes that cannot support an operation return
/// [`IoError::Unsupported`]; a closed handle fails every operation with
/// [`IoError::Closed`] except `close`, which stays idempotent.
pub trait IoHandle {
    /// Read up to `n` bytes, decoded through `charset`. Returns `""` at end
    /// of stream and sets the EOF flag on any short read.
    fn read(&mut self, n: usize, charset: Charset) -> IoResult<String>;

    /// Write a byte buffer; returns the number of bytes written (all of
    /// them, in the absence of an error).
    fn write(&mut self, bytes: &[u8]) -> IoResult<usize>;

    /// Commit implementation-buffered data.
    fn flush(&mut self) -> IoResult<()>;

    /// Flush and release the OS resource. Idempotent.
    fn close(&mut self) -> IoResult<()>;

    /// Whether a read has observed end-of-stream. Cleared only by a
    /// successful seek.
    fn eof(&self) -> bool;

    /// Current byte position, or -1 where meaningless.
    fn tell(&self) -> i64 {
        -1
    }

    /// Reposition; resets the EOF flag.
    fn seek(&mut self, _pos: i64, _whence: Whence) -> IoResult<u64> {
        Err(IoError::Unsupported("seek"))
    }

    /// Set the stream length.
    fn truncate(&mut self, _len: u64) -> IoResult<()> {
        Err(IoError::Unsupported("truncate"))
    }

    /// OS-level descriptor, where one exists.
    fn fileno(&self) -> Option<i32> {
        None
    }

    /// Push back a code point; the next read sees it first. `-1` is a
    /// no-op, other invalid code points fail. Write-only shapes don't keep
    /// a push-back buffer and refuse.
    fn ungetc(&mut self, cp: i32) -> IoResult<()> {
        if cp == -1 {
            return Ok(());
        }
        Err(IoError::Unsupported("ungetc"))
    }
}

/// Pushed-back code points ahead of the next read, FIFO by push-front
/// semantics. Every readable backing shape embeds one; seeking clears it.
#[derive(Debug, Default)]
pub(crate) struct UngetBuffer {
    chars: VecDeque<char>,
}

impl UngetBuffer {
    /// Push a code point. `-1` is a no-op, invalid code points fail.
    pub fn push(&mut self, cp: i32) -> IoResult<()> {
        if cp == -1 {
            return Ok(());
        }
        let c = u32::try_from(cp)
            .ok()
            .and_then(char::from_u32)
            .ok_or(IoError::InvalidCodepoint(cp as u32))?;
        self.chars.push_front(c);
        Ok(())
    }

    /// Next pushed-back character, if any.
    pub fn pop(&mut self) -> Option<char> {
        self.chars.pop_front()
    }

    /// Move pushed-back characters into `out`, charging each against the
    /// byte budget at its width in `charset`.
    pub fn drain(&mut self, out: &mut String, budget: &mut usize, charset: Charset) {
        while *budget > 0 {
            let Some(c) = self.chars.pop_front() else {
                break;
            };
            let width = charset.encoded_len(c).max(1);
            if width > *budget && !out.is_empty() {
                self.chars.push_front(c);
                break;
            }
            *budget = budget.saturating_sub(width);
            out.push(c);
        }
    }

    pub fn clear(&mut self) {
        self.chars.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// Sentinel standing in for a handle that was closed; every operation fails
/// with the dedicated closed-handle error.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosedHandle;

impl IoHandle for ClosedHandle {
    fn read(&mut self, _n: usize, _charset: Charset) -> IoResult<String> {
        Err(IoError::Closed)
    }

    fn write(&mut self, _bytes: &[u8]) -> IoResult<usize> {
        Err(IoError::Closed)
    }

    fn flush(&mut self) -> IoResult<()> {
        Err(IoError::Closed)
    }

    fn close(&mut self) -> IoResult<()> {
        Ok(())
    }

    fn eof(&self) -> bool {
        true
    }

    fn seek(&mut self, _pos: i64, _whence: Whence) -> IoResult<u64> {
        Err(IoError::Closed)
    }

    fn truncate(&mut self, _len: u64) -> IoResult<()> {
        Err(IoError::Closed)
    }

    fn ungetc(&mut self, _cp: i32) -> IoResult<()> {
        Err(IoError::Closed)
    }
}

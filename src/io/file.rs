//! OS file channel.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{IoError, IoResult};

use super::charset::{Charset, DecodeState};
use super::handle::{IoHandle, UngetBuffer, Whence};

/// How a file is opened, mirroring the Perl open modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `<` — read only.
    Read,
    /// `>` — create or truncate, write only.
    Write,
    /// `>>` — create, append.
    Append,
    /// `+<` — read and write, no truncation.
    ReadWrite,
}

/// Byte-seekable file handle. Default layer stack is raw.
pub struct FileHandle {
    file: Option<File>,
    eof: bool,
    dec: DecodeState,
    unget: UngetBuffer,
}

impl FileHandle {
    /// Open a path.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> IoResult<Self> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
            OpenMode::ReadWrite => options.read(true).write(true).create(true),
        };
        let file = options.open(path)?;
        Ok(Self {
            file: Some(file),
            eof: false,
            dec: DecodeState::default(),
            unget: UngetBuffer::default(),
        })
    }

    fn file_mut(&mut self) -> IoResult<&mut File> {
        self.file.as_mut().ok_or(IoError::Closed)
    }
}

impl IoHandle for FileHandle {
    fn read(&mut self, n: usize, charset: Charset) -> IoResult<String> {
        if self.file.is_none() {
            return Err(IoError::Closed);
        }

        let mut out = String::new();
        let mut budget = n;
        self.unget.drain(&mut out, &mut budget, charset);

        if budget > 0 {
            let file = self.file_mut()?;
            let mut buf = vec![0u8; budget];
            let mut got = 0;

            while got < buf.len() {
                match file.read(&mut buf[got..])? {
                    0 => break,
                    count => got += count,
                }
            }
            if got < budget {
                self.eof = true;
            }

            let text = self.dec.decode(charset, &buf[..got]);
            out.push_str(&text);
        }

        Ok(out)
    }

    fn write(&mut self, bytes: &[u8]) -> IoResult<usize> {
        self.file_mut()?.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.file_mut()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> IoResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn tell(&self) -> i64 {
        self.file
            .as_ref()
            .and_then(|mut f| f.stream_position().ok())
            .map(|p| p as i64)
            .unwrap_or(-1)
    }

    fn seek(&mut self, pos: i64, whence: Whence) -> IoResult<u64> {
        let from = match whence {
            Whence::Set => SeekFrom::Start(pos.max(0) as u64),
            Whence::Cur => SeekFrom::Current(pos),
            Whence::End => SeekFrom::End(pos),
        };
        let at = self.file_mut()?.seek(from)?;
        self.eof = false;
        self.dec.reset();
        self.unget.clear();
        Ok(at)
    }

    fn truncate(&mut self, len: u64) -> IoResult<()> {
        self.file_mut()?.set_len(len)?;
        Ok(())
    }

    fn fileno(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            self.file.as_ref().map(|f| f.as_raw_fd())
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    fn ungetc(&mut self, cp: i32) -> IoResult<()> {
        if self.file.is_none() {
            return Err(IoError::Closed);
        }
        self.unget.push(cp)
    }
}

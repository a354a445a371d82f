//! Directory handle.

use std::path::Path;

use crate::error::{IoError, IoResult};

/// Directory reader with the `readdir`/`seekdir`/`telldir` API. The entry
/// list is materialised at open; positions index into it. `.` and `..`
/// always come first.
pub struct DirectoryHandle {
    entries: Vec<String>,
    pos: usize,
    closed: bool,
}

impl DirectoryHandle {
    /// Open a directory.
    pub fn open(path: impl AsRef<Path>) -> IoResult<Self> {
        let mut entries = vec![".".to_string(), "..".to_string()];
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(Self {
            entries,
            pos: 0,
            closed: false,
        })
    }

    /// Next entry name, or `None` when exhausted.
    pub fn readdir(&mut self) -> IoResult<Option<String>> {
        self.ensure_open()?;
        let entry = self.entries.get(self.pos).cloned();
        if entry.is_some() {
            self.pos += 1;
        }
        Ok(entry)
    }

    /// Current position.
    pub fn telldir(&self) -> usize {
        self.pos
    }

    /// Jump to a position previously returned by `telldir`.
    pub fn seekdir(&mut self, pos: usize) -> IoResult<()> {
        self.ensure_open()?;
        self.pos = pos.min(self.entries.len());
        Ok(())
    }

    /// Back to the start.
    pub fn rewinddir(&mut self) -> IoResult<()> {
        self.ensure_open()?;
        self.pos = 0;
        Ok(())
    }

    /// Close; idempotent.
    pub fn closedir(&mut self) -> IoResult<()> {
        self.closed = true;
        Ok(())
    }

    fn ensure_open(&self) -> IoResult<()> {
        if self.closed {
            Err(IoError::Closed)
        } else {
            Ok(())
        }
    }
}

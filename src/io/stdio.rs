//! Standard streams.
//!
//! Writer variants push onto a sequence-numbered queue drained by a
//! dedicated thread, so formatting-heavy scripts never block on a slow
//! sink. Sequence numbers guarantee FIFO commit order; `flush` blocks the
//! caller until its last submitted sequence is committed.

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{IoError, IoResult};

use super::charset::{Charset, DecodeState};
use super::handle::{IoHandle, UngetBuffer};

#[derive(Debug, Clone, Copy)]
enum Target {
    Stdout,
    Stderr,
}

enum Msg {
    Write(u64, Vec<u8>),
    Shutdown,
}

/// Asynchronous writer over stdout or stderr.
pub struct StandardStream {
    tx: Option<Sender<Msg>>,
    worker: Option<JoinHandle<()>>,
    submitted: u64,
    committed: Arc<(Mutex<u64>, Condvar)>,
    fd: i32,
}

impl StandardStream {
    /// Writer over standard output.
    pub fn stdout() -> Self {
        Self::spawn(Target::Stdout, 1)
    }

    /// Writer over standard error.
    pub fn stderr() -> Self {
        Self::spawn(Target::Stderr, 2)
    }

    fn spawn(target: Target, fd: i32) -> Self {
        let (tx, rx) = unbounded();
        let committed = Arc::new((Mutex::new(0u64), Condvar::new()));
        let shared = committed.clone();

        let worker = std::thread::Builder::new()
            .name("perlvm-stream-writer".to_string())
            .spawn(move || writer_loop(rx, target, shared))
            .expect("spawn writer thread");

        Self {
            tx: Some(tx),
            worker: Some(worker),
            submitted: 0,
            committed,
            fd,
        }
    }

    fn wait_committed(&self, upto: u64) {
        let (lock, cv) = &*self.committed;
        let mut done = lock.lock();
        while *done < upto {
            cv.wait(&mut done);
        }
    }
}

fn writer_loop(rx: Receiver<Msg>, target: Target, committed: Arc<(Mutex<u64>, Condvar)>) {
    let commit = |seq: u64| {
        let (lock, cv) = &*committed;
        *lock.lock() = seq;
        cv.notify_all();
    };

    // Interrupt or sender drop both end the loop; either way the queue is
    // drained before exit.
    while let Ok(msg) = rx.recv() {
        match msg {
            Msg::Write(seq, bytes) => {
                match target {
                    Target::Stdout => {
                        let mut out = std::io::stdout().lock();
                        let _ = out.write_all(&bytes);
                        if rx.is_empty() {
                            let _ = out.flush();
                        }
                    }
                    Target::Stderr => {
                        let mut out = std::io::stderr().lock();
                        let _ = out.write_all(&bytes);
                    }
                }
                trace!(seq, len = bytes.len(), "committed write");
                commit(seq);
            }
            Msg::Shutdown => break,
        }
    }

    match target {
        Target::Stdout => {
            let _ = std::io::stdout().flush();
        }
        Target::Stderr => {
            let _ = std::io::stderr().flush();
        }
    }
}

impl IoHandle for StandardStream {
    fn read(&mut self, _n: usize, _charset: Charset) -> IoResult<String> {
        Err(IoError::Unsupported("read"))
    }

    fn write(&mut self, bytes: &[u8]) -> IoResult<usize> {
        let tx = self.tx.as_ref().ok_or(IoError::Closed)?;
        self.submitted += 1;
        tx.send(Msg::Write(self.submitted, bytes.to_vec()))
            .map_err(|_| IoError::Closed)?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        if self.tx.is_none() {
            return Err(IoError::Closed);
        }
        self.wait_committed(self.submitted);
        Ok(())
    }

    fn close(&mut self) -> IoResult<()> {
        if let Some(tx) = self.tx.take() {
            self.wait_committed(self.submitted);
            let _ = tx.send(Msg::Shutdown);
            drop(tx);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }

    fn eof(&self) -> bool {
        false
    }

    fn fileno(&self) -> Option<i32> {
        Some(self.fd)
    }
}

impl Drop for StandardStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Blocking reader over standard input.
pub struct StandardInput {
    eof: bool,
    closed: bool,
    dec: DecodeState,
    unget: UngetBuffer,
}

impl StandardInput {
    /// Reader over standard input.
    pub fn new() -> Self {
        Self {
            eof: false,
            closed: false,
            dec: DecodeState::default(),
            unget: UngetBuffer::default(),
        }
    }
}

impl Default for StandardInput {
    fn default() -> Self {
        Self::new()
    }
}

impl IoHandle for StandardInput {
    fn read(&mut self, n: usize, charset: Charset) -> IoResult<String> {
        if self.closed {
            return Err(IoError::Closed);
        }

        let mut out = String::new();
        let mut budget = n;
        self.unget.drain(&mut out, &mut budget, charset);

        if budget > 0 {
            let mut buf = vec![0u8; budget];
            let got = std::io::stdin().lock().read(&mut buf)?;
            if got < budget {
                self.eof = true;
            }
            let text = self.dec.decode(charset, &buf[..got]);
            out.push_str(&text);
        }

        Ok(out)
    }

    fn write(&mut self, _bytes: &[u8]) -> IoResult<usize> {
        Err(IoError::Unsupported("write"))
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }

    fn close(&mut self) -> IoResult<()> {
        self.closed = true;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn fileno(&self) -> Option<i32> {
        Some(0)
    }

    fn ungetc(&mut self, cp: i32) -> IoResult<()> {
        if self.closed {
            return Err(IoError::Closed);
        }
        self.unget.push(cp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_waits_for_all_submitted_writes() {
        let mut out = StandardStream::stderr();
        for _ in 0..64 {
            out.write(b"").unwrap();
        }
        out.flush().unwrap();

        let (lock, _) = &*out.committed;
        assert_eq!(*lock.lock(), out.submitted);
    }

    #[test]
    fn close_is_idempotent_and_write_after_close_fails() {
        let mut out = StandardStream::stderr();
        out.write(b"").unwrap();
        out.close().unwrap();
        out.close().unwrap();
        assert!(matches!(out.write(b"x"), Err(IoError::Closed)));
    }
}

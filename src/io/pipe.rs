//! Process pipes.
//!
//! Commands containing shell metacharacters run under a system shell;
//! plain commands are split on whitespace and executed directly. The
//! child's other stream is drained by a daemon thread so a chatty process
//! can never deadlock the script.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use tracing::debug;

use crate::error::{IoError, IoResult};

use super::charset::{Charset, DecodeState};
use super::handle::{IoHandle, UngetBuffer};

const METACHARS: &str = "*?[]{}()<>|&;`'\"\\$";

fn needs_shell(command: &str) -> bool {
    command
        .chars()
        .any(|c| METACHARS.contains(c) || c.is_whitespace())
}

fn build_command(command: &str) -> Command {
    if needs_shell(command) {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd.exe");
            c.arg("/c");
            c
        } else {
            let mut c = Command::new("/bin/sh");
            c.arg("-c");
            c
        };
        cmd.arg(command);
        cmd
    } else {
        let mut parts = command.split_whitespace();
        let mut cmd = Command::new(parts.next().unwrap_or(""));
        cmd.args(parts);
        cmd
    }
}

fn drain_stderr(child: &mut Child) -> Option<JoinHandle<()>> {
    let mut stderr = child.stderr.take()?;
    std::thread::Builder::new()
        .name("perlvm-pipe-stderr".to_string())
        .spawn(move || {
            let _ = std::io::copy(&mut stderr, &mut std::io::sink());
        })
        .ok()
}

/// Input pipe: `open($fh, '-|', $cmd)` — reads the child's stdout as raw
/// octets.
pub struct PipeReader {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<JoinHandle<()>>,
    exit: Option<i32>,
    eof: bool,
    dec: DecodeState,
    unget: UngetBuffer,
}

impl PipeReader {
    /// Spawn the command and read from its stdout.
    pub fn open(command: &str) -> IoResult<Self> {
        let mut child = build_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        debug!(%command, shell = needs_shell(command), "spawned input pipe");

        let stdout = child.stdout.take();
        let stderr_drain = drain_stderr(&mut child);
        Ok(Self {
            child,
            stdout,
            stderr_drain,
            exit: None,
            eof: false,
            dec: DecodeState::default(),
            unget: UngetBuffer::default(),
        })
    }

    /// Exit code, available after `close`.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit
    }

    /// Whether the child is still running.
    pub fn is_alive(&mut self) -> bool {
        match self.exit {
            Some(_) => false,
            None => matches!(self.child.try_wait(), Ok(None)),
        }
    }
}

impl IoHandle for PipeReader {
    fn read(&mut self, n: usize, charset: Charset) -> IoResult<String> {
        if self.stdout.is_none() {
            return Err(IoError::Closed);
        }

        let mut out = String::new();
        let mut budget = n;
        self.unget.drain(&mut out, &mut budget, charset);

        if budget > 0 {
            let stdout = self.stdout.as_mut().ok_or(IoError::Closed)?;
            let mut buf = vec![0u8; budget];
            let mut got = 0;
            while got < buf.len() {
                match stdout.read(&mut buf[got..])? {
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

    fn write(&mut self, _bytes: &[u8]) -> IoResult<usize> {
        if self.stdout.is_none() {
            return Err(IoError::Closed);
        }
        Err(IoError::Unsupported("write"))
    }

    fn flush(&mut self) -> IoResult<()> {
        if self.stdout.is_none() {
            return Err(IoError::Closed);
        }
        Ok(())
    }

    fn close(&mut self) -> IoResult<()> {
        if self.stdout.take().is_some() {
            let status = self.child.wait()?;
            self.exit = Some(status.code().unwrap_or(-1));
            if let Some(drain) = self.stderr_drain.take() {
                let _ = drain.join();
            }
        }
        Ok(())
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn fileno(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            self.stdout.as_ref().map(|s| s.as_raw_fd())
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    fn ungetc(&mut self, cp: i32) -> IoResult<()> {
        if self.stdout.is_none() {
            return Err(IoError::Closed);
        }
        self.unget.push(cp)
    }
}

/// Output pipe: `open($fh, '|-', $cmd)` — writes feed the child's stdin;
/// closing waits for the child to terminate.
pub struct PipeWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<()>>,
    exit: Option<i32>,
}

impl PipeWriter {
    /// Spawn the command and write to its stdin.
    pub fn open(command: &str) -> IoResult<Self> {
        let mut child = build_command(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        debug!(%command, shell = needs_shell(command), "spawned output pipe");

        let stdin = child.stdin.take();
        let stderr_drain = drain_stderr(&mut child);
        Ok(Self {
            child,
            stdin,
            stderr_drain,
            exit: None,
        })
    }

    /// Exit code, available after `close`.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit
    }
}

impl IoHandle for PipeWriter {
    fn read(&mut self, _n: usize, _charset: Charset) -> IoResult<String> {
        if self.stdin.is_none() {
            return Err(IoError::Closed);
        }
        Err(IoError::Unsupported("read"))
    }

    fn write(&mut self, bytes: &[u8]) -> IoResult<usize> {
        let stdin = self.stdin.as_mut().ok_or(IoError::Closed)?;
        stdin.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        let stdin = self.stdin.as_mut().ok_or(IoError::Closed)?;
        stdin.flush()?;
        Ok(())
    }

    fn close(&mut self) -> IoResult<()> {
        if self.stdin.take().is_some() {
            let status = self.child.wait()?;
            self.exit = Some(status.code().unwrap_or(-1));
            if let Some(drain) = self.stderr_drain.take() {
                let _ = drain.join();
            }
        }
        Ok(())
    }

    fn eof(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metacharacter_detection() {
        assert!(needs_shell("ls *.txt"));
        assert!(needs_shell("echo hello"));
        assert!(needs_shell("a|b"));
        assert!(!needs_shell("true"));
        assert!(!needs_shell("ls"));
    }
}

//! TCP socket handle.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{IoError, IoResult};

use super::charset::{Charset, DecodeState};
use super::handle::{IoHandle, UngetBuffer};

enum SocketState {
    Fresh,
    Bound(SocketAddr),
    Listening(TcpListener),
    Connected(TcpStream),
    Closed,
}

/// Client or server TCP socket.
///
/// `seek`/`tell`/`truncate` are unsupported on sockets. Named options are
/// mapped to native socket options where the platform offers them and kept
/// in a side table either way, so `get_option` returns what was set.
pub struct SocketHandle {
    state: SocketState,
    options: HashMap<String, i32>,
    eof: bool,
    dec: DecodeState,
    unget: UngetBuffer,
}

impl SocketHandle {
    /// Fresh, unconnected socket.
    pub fn new() -> Self {
        Self {
            state: SocketState::Fresh,
            options: HashMap::new(),
            eof: false,
            dec: DecodeState::default(),
            unget: UngetBuffer::default(),
        }
    }

    /// Connect to a remote address.
    pub fn connect(&mut self, addr: impl ToSocketAddrs) -> IoResult<()> {
        match self.state {
            SocketState::Fresh => {
                let stream = TcpStream::connect(addr)?;
                debug!(peer = ?stream.peer_addr().ok(), "socket connected");
                self.state = SocketState::Connected(stream);
                Ok(())
            }
            SocketState::Closed => Err(IoError::Closed),
            _ => Err(IoError::Unsupported("connect")),
        }
    }

    /// Bind a local address.
    pub fn bind(&mut self, addr: impl ToSocketAddrs) -> IoResult<()> {
        match self.state {
            SocketState::Fresh => {
                let addr = addr
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| IoError::Os(std::io::ErrorKind::AddrNotAvailable.into()))?;
                self.state = SocketState::Bound(addr);
                Ok(())
            }
            SocketState::Closed => Err(IoError::Closed),
            _ => Err(IoError::Unsupported("bind")),
        }
    }

    /// Start listening on the bound address.
    pub fn listen(&mut self, _backlog: u32) -> IoResult<()> {
        match &self.state {
            SocketState::Bound(addr) => {
                let listener = TcpListener::bind(addr)?;
                debug!(local = ?listener.local_addr().ok(), "socket listening");
                self.state = SocketState::Listening(listener);
                Ok(())
            }
            SocketState::Closed => Err(IoError::Closed),
            _ => Err(IoError::Unsupported("listen")),
        }
    }

    /// Accept one connection; the listener keeps listening.
    pub fn accept(&mut self) -> IoResult<SocketHandle> {
        match &self.state {
            SocketState::Listening(listener) => {
                let (stream, peer) = listener.accept()?;
                debug!(?peer, "accepted connection");
                Ok(SocketHandle {
                    state: SocketState::Connected(stream),
                    options: HashMap::new(),
                    eof: false,
                    dec: DecodeState::default(),
                    unget: UngetBuffer::default(),
                })
            }
            SocketState::Closed => Err(IoError::Closed),
            _ => Err(IoError::Unsupported("accept")),
        }
    }

    /// Set a named option. Known names apply natively on a connected
    /// stream; everything lands in the side table.
    pub fn set_option(&mut self, name: &str, value: i32) -> IoResult<()> {
        if let SocketState::Connected(stream) = &self.state {
            match name {
                "TCP_NODELAY" => stream.set_nodelay(value != 0)?,
                "SO_RCVTIMEO" => {
                    stream.set_read_timeout((value > 0).then(|| Duration::from_secs(value as u64)))?
                }
                "SO_SNDTIMEO" => {
                    stream.set_write_timeout((value > 0).then(|| Duration::from_secs(value as u64)))?
                }
                "IP_TTL" => stream.set_ttl(value as u32)?,
                _ => (),
            }
        }
        self.options.insert(name.to_string(), value);
        Ok(())
    }

    /// Read back an option, verbatim.
    pub fn get_option(&self, name: &str) -> Option<i32> {
        self.options.get(name).copied()
    }

    /// Local address packed as a 16-byte `sockaddr_in`.
    pub fn local_sockaddr(&self) -> IoResult<[u8; 16]> {
        match &self.state {
            SocketState::Connected(s) => pack_sockaddr_in(s.local_addr()?),
            SocketState::Listening(l) => pack_sockaddr_in(l.local_addr()?),
            SocketState::Bound(addr) => pack_sockaddr_in(*addr),
            SocketState::Closed => Err(IoError::Closed),
            SocketState::Fresh => Err(IoError::Unsupported("getsockname")),
        }
    }

    /// Peer address packed as a 16-byte `sockaddr_in`.
    pub fn peer_sockaddr(&self) -> IoResult<[u8; 16]> {
        match &self.state {
            SocketState::Connected(s) => pack_sockaddr_in(s.peer_addr()?),
            SocketState::Closed => Err(IoError::Closed),
            _ => Err(IoError::Unsupported("getpeername")),
        }
    }

    fn stream_mut(&mut self) -> IoResult<&mut TcpStream> {
        match &mut self.state {
            SocketState::Connected(s) => Ok(s),
            SocketState::Closed => Err(IoError::Closed),
            _ => Err(IoError::Unsupported("read/write before connect")),
        }
    }
}

impl Default for SocketHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IoHandle for SocketHandle {
    fn read(&mut self, n: usize, charset: Charset) -> IoResult<String> {
        match self.state {
            SocketState::Connected(_) => (),
            SocketState::Closed => return Err(IoError::Closed),
            _ => return Err(IoError::Unsupported("read/write before connect")),
        }

        let mut out = String::new();
        let mut budget = n;
        self.unget.drain(&mut out, &mut budget, charset);

        if budget > 0 {
            let stream = self.stream_mut()?;
            let mut buf = vec![0u8; budget];
            let got = stream.read(&mut buf)?;
            if got == 0 {
                self.eof = true;
            }
            let text = self.dec.decode(charset, &buf[..got]);
            out.push_str(&text);
        }

        Ok(out)
    }

    fn write(&mut self, bytes: &[u8]) -> IoResult<usize> {
        self.stream_mut()?.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.stream_mut()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> IoResult<()> {
        self.state = SocketState::Closed;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn fileno(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            match &self.state {
                SocketState::Connected(s) => Some(s.as_raw_fd()),
                SocketState::Listening(l) => Some(l.as_raw_fd()),
                _ => None,
            }
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    fn ungetc(&mut self, cp: i32) -> IoResult<()> {
        if matches!(self.state, SocketState::Closed) {
            return Err(IoError::Closed);
        }
        self.unget.push(cp)
    }
}

/// `[family=0x00 0x02][port hi][port lo][ip0..ip3][8 bytes zero]` —
/// network byte order for family and port, AF_INET assumed.
fn pack_sockaddr_in(addr: SocketAddr) -> IoResult<[u8; 16]> {
    let SocketAddr::V4(v4) = addr else {
        return Err(IoError::Unsupported("sockaddr_in for IPv6"));
    };

    let mut out = [0u8; 16];
    out[1] = 2; // AF_INET
    out[2..4].copy_from_slice(&v4.port().to_be_bytes());
    out[4..8].copy_from_slice(&v4.ip().octets());
    Ok(out)
}

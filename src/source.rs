use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

/// One received datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub payload: Bytes,
    /// Monotonic offset from the source's clock origin.
    pub received_at: Duration,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Next {
    Event(Event),
    /// Nothing arrived within the source's wait bound.
    Idle,
    /// The source has no more events.
    Exhausted,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot bind UDP socket at {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("receive failed")]
    Receive(#[source] io::Error),
    #[error("cannot read fixture {path}")]
    FixtureIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed fixture at line {line}: {reason}")]
    Fixture { line: usize, reason: String },
    #[error("cannot record event")]
    Record(#[source] io::Error),
}

/// Anything that yields received datagrams one at a time.
pub trait EventSource {
    fn next_event(&mut self) -> Result<Next, SourceError>;
}

pub struct UdpSource {
    socket: UdpSocket,
    buffer: Vec<u8>,
    origin: Instant,
}

impl UdpSource {
    /// Binds `addr`. Datagrams longer than `capacity` are truncated by the receive call.
    /// Without `timeout` every receive blocks until a datagram arrives.
    pub fn bind(addr: SocketAddr, capacity: usize, timeout: Option<Duration>) -> Result<Self, SourceError> {
        let socket = UdpSocket::bind(addr).map_err(|source| SourceError::Bind { addr, source })?;
        socket
            .set_read_timeout(timeout)
            .map_err(|source| SourceError::Bind { addr, source })?;
        Ok(Self {
            socket,
            buffer: vec![0u8; capacity],
            origin: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl EventSource for UdpSource {
    fn next_event(&mut self) -> Result<Next, SourceError> {
        loop {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((n, from)) => {
                    let received_at = self.origin.elapsed();
                    trace!(%from, len = n, "Datagram");
                    return Ok(Next::Event(Event {
                        payload: Bytes::copy_from_slice(&self.buffer[..n]),
                        received_at,
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Ok(Next::Idle);
                }
                Err(e) => return Err(SourceError::Receive(e)),
            }
        }
    }
}

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::message::Identity;
use crate::protocol::frame;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a registered connection.
///
/// Ids are handed out in increasing order and never reused while the process
/// runs, so ordering by id is registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value of this id.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What one read attempt produced.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Inbound {
    /// One complete frame's payload, already unmasked.
    Frame(Vec<u8>),
    /// Nothing to process yet: socket not ready or frame incomplete.
    Pending,
    /// The peer closed its end.
    Closed,
}

/// A registered client connection.
///
/// The socket is owned here and taken out when the registry removes the
/// connection, so a removed `Connection` can no longer perform I/O.
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    state: ConnectionState,
    identity: Identity,
    stream: Option<TcpStream>,
    read_buf: BytesMut,
    torn: bool,
}

impl Connection {
    /// Wrap an upgraded socket. The connection stays `HandshakePending`
    /// until the registry activates it.
    pub(crate) fn new(stream: TcpStream, addr: SocketAddr, buffered: &[u8]) -> Self {
        Self {
            id: ConnectionId::next(),
            addr,
            state: ConnectionState::HandshakePending,
            identity: Identity::new(),
            stream: Some(stream),
            read_buf: BytesMut::from(buffered),
            torn: false,
        }
    }

    /// The connection's id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address captured at accept time.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Remote IP address.
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Attributes accepted at identification; empty before.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Whether a routing policy has accepted this connection's identification.
    pub fn is_identified(&self) -> bool {
        self.state.is_identified()
    }

    pub(crate) fn activate(&mut self) {
        if self.state.can_transition_to(ConnectionState::Unidentified) {
            self.state = ConnectionState::Unidentified;
        }
    }

    /// Whether a write stopped partway through a frame. The peer can no
    /// longer find frame boundaries, so the connection must be removed.
    pub(crate) fn is_torn(&self) -> bool {
        self.torn
    }

    pub(crate) fn identify(&mut self, identity: Identity) {
        self.identity.merge(identity);
        if self.state.can_transition_to(ConnectionState::Identified) {
            self.state = ConnectionState::Identified;
        }
    }

    /// Close the socket. Dropping the stream is enough even when the peer
    /// has already half-closed it.
    pub(crate) fn close(&mut self) {
        self.stream = None;
        self.read_buf.clear();
        self.state = ConnectionState::Removed;
    }

    /// Whether a complete frame is already buffered.
    pub(crate) fn has_buffered_frame(&self) -> bool {
        frame::frame_len(&self.read_buf).is_some_and(|len| self.read_buf.len() >= len)
    }

    /// Resolve once the socket has readiness to report.
    ///
    /// Never resolves for a closed connection.
    pub(crate) async fn readable(&self) -> io::Result<()> {
        match &self.stream {
            Some(stream) => stream.readable().await,
            None => std::future::pending().await,
        }
    }

    /// Read whatever the socket has without blocking, then take at most one
    /// frame from the buffer.
    ///
    /// No read is attempted while a complete frame is already buffered.
    pub(crate) fn poll_frame(&mut self, read_size: usize, max_payload: usize) -> Result<Inbound> {
        if !self.has_buffered_frame() {
            let Some(stream) = &self.stream else {
                return Ok(Inbound::Closed);
            };
            self.read_buf.reserve(read_size.max(1));
            match stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => return Ok(Inbound::Closed),
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(err.into()),
            }
        }

        match frame::decode(&self.read_buf, max_payload)? {
            Some((payload, consumed)) => {
                self.read_buf.advance(consumed);
                Ok(Inbound::Frame(payload))
            }
            None => Ok(Inbound::Pending),
        }
    }

    /// Write one sealed frame, bounded by `timeout`.
    ///
    /// A failure after part of the frame went out marks the connection torn.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transmission`] if the socket is closed, the write
    /// fails or the timeout elapses.
    pub(crate) async fn write_frame(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        let id = self.id;
        let failed = |reason: String| Error::Transmission {
            target: id.to_string(),
            reason,
        };

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| failed("connection closed".into()))?;

        let mut written = 0;
        let outcome = tokio::time::timeout(timeout, async {
            while written < bytes.len() {
                let n = stream.write(&bytes[written..]).await?;
                if n == 0 {
                    return Err(io::Error::from(io::ErrorKind::WriteZero));
                }
                written += n;
            }
            stream.flush().await
        })
        .await;

        let reason = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("write timed out after {:?}", timeout),
        };
        if written > 0 && written < bytes.len() {
            self.torn = true;
        }
        Err(failed(format!("{reason} ({written} of {} bytes sent)", bytes.len())))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("buffered", &self.read_buf.len())
            .field("torn", &self.torn)
            .finish()
    }
}

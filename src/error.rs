//! Error types for the hub.
//!
//! Every failure is scoped to a single connection. [`HandshakeError`] drops a
//! socket before it is registered, [`FrameDecodeError`] is treated as a
//! disconnect, [`IdentificationRejected`] leaves the connection open for a
//! retry and [`Error::Transmission`] is logged and skipped during fan-out.

use thiserror::Error;

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for hub operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The opening HTTP upgrade exchange failed.
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// An inbound frame could not be decoded.
    #[error("Frame decode failed: {0}")]
    FrameDecode(#[from] FrameDecodeError),

    /// The routing policy rejected an identification attempt.
    #[error("Identification rejected: {0}")]
    IdentificationRejected(#[from] IdentificationRejected),

    /// Writing to an individual socket failed.
    #[error("Transmission to {target} failed: {reason}")]
    Transmission {
        /// Display form of the connection that could not be written.
        target: String,
        /// Underlying cause.
        reason: String,
    },

    /// I/O error on the listener or a socket.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Failure while negotiating the HTTP upgrade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandshakeError {
    /// The request carried no `Sec-WebSocket-Key` header.
    #[error("missing key")]
    MissingKey,

    /// The request was not valid UTF-8.
    #[error("request is not valid UTF-8")]
    InvalidUtf8,

    /// The request exceeded the configured size limit.
    #[error("request too large: {size} bytes (max: {max})")]
    TooLarge {
        /// Bytes received so far.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The peer closed the socket before the request was complete.
    #[error("peer closed before request was complete")]
    Incomplete,

    /// The request did not arrive within the handshake timeout.
    #[error("timed out waiting for request")]
    Timeout,

    /// Reading the request or writing the response failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for HandshakeError {
    fn from(err: std::io::Error) -> Self {
        HandshakeError::Io(err.to_string())
    }
}

/// Failure while decoding an inbound frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameDecodeError {
    /// Fewer bytes than the header, mask key and declared payload require.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Total bytes the header declares.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// Client frame without the mask bit.
    #[error("client frame must be masked")]
    Unmasked,

    /// Declared payload length exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge {
        /// Declared payload length.
        size: u64,
        /// Configured maximum.
        max: usize,
    },
}

/// Application-level rejection of an identification message.
///
/// The policy that returns this is responsible for telling the peer why.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct IdentificationRejected {
    /// Human-readable reason, e.g. the missing field.
    pub reason: String,
}

impl IdentificationRejected {
    /// Create a rejection with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

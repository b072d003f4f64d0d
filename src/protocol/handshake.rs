//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! The hub answers every upgrade request that carries a
//! `Sec-WebSocket-Key` with a fixed `101` response. No origin, version,
//! subprotocol or extension negotiation takes place.

use crate::error::HandshakeError;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Path advertised in the `WebSocket-Location` response header.
///
/// Existing clients compare this value literally.
pub const LOCATION_PATH: &str = "/demo/shout.php";

/// Name of the header carrying the client's nonce.
pub const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Blank line terminating the request head.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parse `Name: Value` header lines.
///
/// Names are kept exactly as sent (case-sensitive) and may not contain
/// whitespace. Each line is split on the first `": "`, trailing whitespace is
/// stripped from the value, and lines that do not fit the pattern (including
/// the request line) are skipped. A repeated name keeps its last value.
fn parse_headers(text: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for line in text.split("\r\n") {
        let line = line.trim_end();
        if let Some((name, value)) = line.split_once(": ") {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                continue;
            }
            headers.insert(name.to_string(), value.to_string());
        }
    }

    headers
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wshub::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Position just past the blank line ending the request head, if present.
#[must_use]
pub fn head_end(data: &[u8]) -> Option<usize> {
    data.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// Parsed upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The Sec-WebSocket-Key header value.
    pub key: String,
    headers: HashMap<String, String>,
}

impl HandshakeRequest {
    /// Parse an upgrade request from raw HTTP data.
    ///
    /// # Errors
    ///
    /// - [`HandshakeError::InvalidUtf8`] if the data is not UTF-8
    /// - [`HandshakeError::MissingKey`] if there is no `Sec-WebSocket-Key` header
    pub fn parse(data: &[u8]) -> Result<Self, HandshakeError> {
        let text = std::str::from_utf8(data).map_err(|_| HandshakeError::InvalidUtf8)?;
        let headers = parse_headers(text);
        let key = headers
            .get(KEY_HEADER)
            .cloned()
            .ok_or(HandshakeError::MissingKey)?;

        Ok(Self { key, headers })
    }

    /// Parse a request with a size limit.
    ///
    /// # Errors
    ///
    /// - [`HandshakeError::TooLarge`] if data exceeds `max_size`
    /// - Other handshake errors as per [`HandshakeRequest::parse`]
    pub fn parse_with_limit(data: &[u8], max_size: usize) -> Result<Self, HandshakeError> {
        if data.len() > max_size {
            return Err(HandshakeError::TooLarge {
                size: data.len(),
                max: max_size,
            });
        }
        Self::parse(data)
    }

    /// Look up a header by its exact name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// The `101` response sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// Host echoed in `WebSocket-Origin` and `WebSocket-Location`.
    pub host: String,
    /// Port echoed in `WebSocket-Location`.
    pub port: u16,
}

impl HandshakeResponse {
    /// Create a response for `req` on behalf of a server bound to `host:port`.
    pub fn from_request(req: &HandshakeRequest, host: &str, port: u16) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            host: host.to_string(),
            port,
        }
    }

    /// Append the HTTP response to a buffer.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 101 Web Socket Protocol Handshake\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("WebSocket-Origin: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(
            format!(
                "WebSocket-Location: ws://{}:{}{}\r\n",
                self.host, self.port, LOCATION_PATH
            )
            .as_bytes(),
        );
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n\r\n", self.accept).as_bytes());
    }

    /// Serialize the response into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        self.write(&mut buf);
        buf
    }
}

/// Read the upgrade request from `io` and write the `101` response.
///
/// Reads until the blank line ending the request head, bounded by
/// `max_size` bytes and `timeout`. Returns the parsed request together with
/// any bytes the client sent after the head, which belong to the frame
/// stream.
///
/// # Errors
///
/// - [`HandshakeError::Timeout`] if the exchange does not finish in time
/// - [`HandshakeError::Incomplete`] if the peer closes before the blank line
/// - [`HandshakeError::TooLarge`] if the head exceeds `max_size`
/// - [`HandshakeError::MissingKey`] / [`HandshakeError::InvalidUtf8`] from parsing
/// - [`HandshakeError::Io`] on socket errors
#[cfg(feature = "async-tokio")]
pub async fn negotiate<T>(
    io: &mut T,
    host: &str,
    port: u16,
    max_size: usize,
    timeout: std::time::Duration,
) -> Result<(HandshakeRequest, Vec<u8>), HandshakeError>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let exchange = async {
        let mut data = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];

        let end = loop {
            if let Some(end) = head_end(&data) {
                break end;
            }
            if data.len() > max_size {
                return Err(HandshakeError::TooLarge {
                    size: data.len(),
                    max: max_size,
                });
            }
            let n = io.read(&mut chunk).await?;
            if n == 0 {
                return Err(HandshakeError::Incomplete);
            }
            data.extend_from_slice(&chunk[..n]);
        };

        let request = HandshakeRequest::parse_with_limit(&data[..end], max_size)?;
        let response = HandshakeResponse::from_request(&request, host, port);
        io.write_all(&response.to_bytes()).await?;
        io.flush().await?;

        Ok::<_, HandshakeError>((request, data.split_off(end)))
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| HandshakeError::Timeout)?
}

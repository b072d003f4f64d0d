//! Raw WebSocket test client.
//!
//! Performs the upgrade by hand and frames messages with `seal_masked`, so
//! the tests exercise exactly the bytes a browser would send.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use wshub::protocol::handshake::head_end;
use wshub::protocol::random_mask;
use wshub::{compute_accept_key, seal_masked};

const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient {
    stream: TcpStream,
    response: String,
}

impl TestClient {
    /// Connect and complete the upgrade.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!(
            "GET /chat HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {KEY}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await?;

        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while head_end(&head).is_none() {
            timeout(RECV_TIMEOUT, stream.read_exact(&mut byte))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no handshake response"))??;
            head.push(byte[0]);
        }

        let response = String::from_utf8(head)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let expected = format!("Sec-WebSocket-Accept: {}\r\n", compute_accept_key(KEY));
        if !response.starts_with("HTTP/1.1 101 ") || !response.contains(&expected) {
            return Err(io::Error::new(io::ErrorKind::InvalidData, response));
        }

        Ok(Self { stream, response })
    }

    /// Connect and swallow the greeting the hub sends to newcomers.
    pub async fn connect_welcomed(addr: SocketAddr) -> io::Result<Self> {
        let mut client = Self::connect(addr).await?;
        client.recv_json().await?;
        Ok(client)
    }

    /// The raw 101 response head.
    pub fn response(&self) -> &str {
        &self.response
    }

    pub async fn send_json(&mut self, value: &Value) -> io::Result<()> {
        self.send_text(&value.to_string()).await
    }

    pub async fn send_text(&mut self, text: &str) -> io::Result<()> {
        let frame = seal_masked(text.as_bytes(), random_mask());
        self.send_raw(&frame).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Read one unmasked server frame and parse its payload as JSON.
    pub async fn recv_json(&mut self) -> io::Result<Value> {
        let payload = timeout(RECV_TIMEOUT, self.recv_payload())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no frame received"))??;
        serde_json::from_slice(&payload).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// Assert nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        let mut byte = [0u8; 1];
        match timeout(wait, self.stream.read(&mut byte)).await {
            Err(_) => {}
            Ok(Ok(0)) => panic!("connection closed while expecting silence"),
            Ok(result) => panic!("unexpected data while expecting silence: {:?}", result),
        }
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match timeout(RECV_TIMEOUT, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return,
                Ok(Ok(_)) => continue,
                Err(_) => panic!("server did not close the connection"),
            }
        }
    }

    async fn recv_payload(&mut self) -> io::Result<Vec<u8>> {
        let mut head = [0u8; 2];
        self.stream.read_exact(&mut head).await?;
        if head[0] != 0x81 || head[1] & 0x80 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected frame header {:02x} {:02x}", head[0], head[1]),
            ));
        }

        let len = match head[1] {
            126 => {
                let mut ext = [0u8; 2];
                self.stream.read_exact(&mut ext).await?;
                u16::from_be_bytes(ext) as usize
            }
            127 => {
                let mut ext = [0u8; 8];
                self.stream.read_exact(&mut ext).await?;
                u64::from_be_bytes(ext) as usize
            }
            n => n as usize,
        };

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(payload)
    }
}

//! The single-threaded event loop.
//!
//! Each [`Server::tick`] waits up to the poll timeout for the listener or any
//! registered socket, admits at most one new connection and then services
//! every connection that was registered when the tick started, taking at
//! most one frame from each.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::future::select_all;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::connection::{Connection, ConnectionId, Inbound, Registry};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{handshake, seal};
use crate::server::outbox::{Envelope, Outbox, Target};
use crate::server::policy::{Identified, Policy};

/// A bound hub driving one [`Policy`].
///
/// # Example
///
/// ```rust,no_run
/// use wshub::{Broadcast, Config, Server};
///
/// # async fn run() -> wshub::Result<()> {
/// let mut server = Server::bind(Config::new().with_port(9000), Broadcast).await?;
/// server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
pub struct Server<P> {
    config: Config,
    listener: TcpListener,
    port: u16,
    registry: Registry,
    policy: P,
}

impl<P: Policy> Server<P> {
    /// Bind the listener on `config.host:config.port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the address cannot be bound.
    pub async fn bind(config: Config, policy: P) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr())
            .await
            .map_err(|err| Error::Io(format!("bind {}: {}", config.bind_addr(), err)))?;
        let port = listener.local_addr()?.port();
        info!(host = %config.host, port, "listening");

        Ok(Self {
            config,
            listener,
            port,
            registry: Registry::new(),
            policy,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The configuration the server was bound with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Live connections.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The routing policy.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Mutable access to the routing policy, for policies that keep state.
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// Run forever.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then close every connection.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = self.tick() => {}
            }
        }

        info!(connections = self.registry.len(), "shutting down");
        self.registry.clear();
        Ok(())
    }

    /// One pass of the event loop.
    pub async fn tick(&mut self) {
        let snapshot = self.registry.ids();

        match self.wait().await {
            Some(Ok((stream, addr))) => self.admit(stream, addr).await,
            Some(Err(err)) => {
                warn!(error = %err, "accept failed");
                tokio::time::sleep(self.config.poll_timeout).await;
            }
            None => {}
        }

        for id in snapshot {
            self.service(id).await;
        }
    }

    /// Wait for a new connection or for any registered socket to become
    /// readable. Returns immediately if a frame is already buffered.
    async fn wait(&self) -> Option<io::Result<(TcpStream, SocketAddr)>> {
        let timeout = if self.registry.all().any(Connection::has_buffered_frame) {
            Duration::ZERO
        } else {
            self.config.poll_timeout
        };

        let readiness: Vec<_> = self
            .registry
            .all()
            .map(|conn| Box::pin(conn.readable()))
            .collect();
        let any_readable = async move {
            if readiness.is_empty() {
                std::future::pending::<()>().await;
            } else {
                let _ = select_all(readiness).await;
            }
        };

        let event = async {
            tokio::select! {
                accepted = self.listener.accept() => Some(accepted),
                () = any_readable => None,
            }
        };

        tokio::time::timeout(timeout, event).await.ok().flatten()
    }

    async fn admit(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        debug!(peer = %addr, "accepted socket");

        let negotiated = handshake::negotiate(
            &mut stream,
            &self.config.host,
            self.port,
            self.config.limits.max_handshake_size,
            self.config.timeouts.handshake,
        )
        .await;
        let trailing = match negotiated {
            Ok((_, trailing)) => trailing,
            Err(err) => {
                warn!(peer = %addr, error = %err, "handshake failed");
                return;
            }
        };

        let id = self.registry.register_with_buffer(stream, addr, &trailing);
        info!(conn = %id, peer = %addr, "client connected");

        let mut out = Outbox::new();
        if let Some(conn) = self.registry.get(id) {
            self.policy.welcome(conn, &mut out);
        }
        self.flush(out).await;
    }

    async fn service(&mut self, id: ConnectionId) {
        let read_size = self.config.read_buffer_size;
        let max_frame = self.config.limits.max_frame_size;
        let Some(conn) = self.registry.get_mut(id) else {
            return;
        };

        let payload = match conn.poll_frame(read_size, max_frame) {
            Ok(Inbound::Frame(payload)) => payload,
            Ok(Inbound::Pending) => return,
            Ok(Inbound::Closed) => {
                debug!(conn = %id, "peer closed");
                self.disconnect(id).await;
                return;
            }
            Err(err) => {
                debug!(conn = %id, error = %err, "dropping connection");
                self.disconnect(id).await;
                return;
            }
        };

        let message = Message::decode(&payload);
        trace!(conn = %id, %message, "received message");

        let Some(conn) = self.registry.get(id) else {
            return;
        };
        if conn.is_identified() {
            let mut out = Outbox::new();
            self.policy.receive(conn, message, &mut out);
            self.flush(out).await;
            return;
        }

        let mut out = Outbox::new();
        let result = self.policy.identify(conn, &message, &mut out);
        self.flush(out).await;

        match result {
            Ok(Identified { identity, forward }) => {
                self.registry.set_identity(id, identity);
                info!(conn = %id, "client identified");
                if forward {
                    let mut out = Outbox::new();
                    if let Some(conn) = self.registry.get(id) {
                        self.policy.receive(conn, message, &mut out);
                    }
                    self.flush(out).await;
                }
            }
            Err(rejected) => {
                debug!(conn = %id, reason = %rejected.reason, "identification rejected");
            }
        }
    }

    async fn disconnect(&mut self, id: ConnectionId) {
        let mut out = Outbox::new();
        self.remove(id, &mut out);
        self.flush(out).await;
    }

    /// Drop `id` from the registry, queueing the disconnect hook's messages
    /// on `out` when notification is enabled.
    fn remove(&mut self, id: ConnectionId, out: &mut Outbox) {
        let Some(conn) = self.registry.remove(id) else {
            return;
        };
        info!(conn = %id, peer = %conn.addr(), "client disconnected");

        if self.config.notify_disconnect {
            self.policy.disconnect(&conn, out);
        }
    }

    /// Deliver queued messages in order. Each message is sealed once.
    ///
    /// Recipients left with half a frame on the wire are removed once the
    /// current batch has gone out, and any disconnect notices are delivered
    /// the same way.
    async fn flush(&mut self, mut out: Outbox) {
        loop {
            let mut torn = Vec::new();
            for Envelope { target, message } in out.drain() {
                let frame = seal(message.to_json().as_bytes());
                let recipients = match &target {
                    Target::Broadcast => self.registry.ids(),
                    Target::Connection(id) => vec![*id],
                    Target::Matching(criteria) => self.registry.matching(criteria),
                };
                trace!(?target, recipients = recipients.len(), "delivering message");

                for id in recipients {
                    if self.deliver(id, &frame).await && !torn.contains(&id) {
                        torn.push(id);
                    }
                }
            }

            if torn.is_empty() {
                return;
            }
            out = Outbox::new();
            for id in torn {
                debug!(conn = %id, "dropping connection after partial write");
                self.remove(id, &mut out);
            }
        }
    }

    /// Write `frame` to one recipient. Returns whether the recipient's
    /// stream was left mid-frame.
    async fn deliver(&mut self, id: ConnectionId, frame: &[u8]) -> bool {
        let timeout = self.config.timeouts.write;
        let Some(conn) = self.registry.get_mut(id) else {
            trace!(conn = %id, "recipient no longer registered");
            return false;
        };
        if conn.is_torn() {
            return true;
        }
        if let Err(err) = conn.write_frame(frame, timeout).await {
            debug!(conn = %id, error = %err, "send failed");
        }
        conn.is_torn()
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for Server<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("port", &self.port)
            .field("connections", &self.registry.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Limits, Timeouts};
    use crate::message::Identity;
    use crate::protocol::handshake::head_end;
    use crate::protocol::{random_mask, seal_masked};
    use crate::server::policy::{Broadcast, SessionRouter};
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const REQUEST: &str = "GET /chat HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\
        Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    async fn server<P: Policy>(policy: P) -> Server<P> {
        let config = Config::new()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_poll_timeout(Duration::from_secs(2));
        Server::bind(config, policy).await.unwrap()
    }

    async fn open(addr: SocketAddr) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(REQUEST.as_bytes()).await.unwrap();

        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while head_end(&head).is_none() {
            stream.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        assert!(head.starts_with(b"HTTP/1.1 101 "));
        stream
    }

    /// Connect one client and let the server admit it.
    async fn join<P: Policy>(server: &mut Server<P>) -> TcpStream {
        let addr = server.local_addr().unwrap();
        let (client, ()) = tokio::join!(open(addr), server.tick());
        client
    }

    async fn recv(stream: &mut TcpStream) -> Value {
        let mut head = [0u8; 2];
        stream.read_exact(&mut head).await.unwrap();
        assert_eq!(head[0], 0x81);
        let len = match head[1] {
            126 => {
                let mut ext = [0u8; 2];
                stream.read_exact(&mut ext).await.unwrap();
                u16::from_be_bytes(ext) as usize
            }
            127 => {
                let mut ext = [0u8; 8];
                stream.read_exact(&mut ext).await.unwrap();
                u64::from_be_bytes(ext) as usize
            }
            n => n as usize,
        };
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        serde_json::from_slice(&payload).unwrap()
    }

    async fn send(stream: &mut TcpStream, value: Value) {
        let frame = seal_masked(value.to_string().as_bytes(), random_mask());
        stream.write_all(&frame).await.unwrap();
    }

    /// Tick until `done` holds, giving up after a few rounds.
    async fn tick_until<P: Policy>(server: &mut Server<P>, done: impl Fn(&Server<P>) -> bool) {
        for _ in 0..10 {
            if done(server) {
                return;
            }
            server.tick().await;
        }
        assert!(done(server), "server did not reach the expected state");
    }

    #[tokio::test]
    async fn test_admit_registers_and_welcomes() {
        let mut server = server(Broadcast).await;
        let mut client = join(&mut server).await;

        assert_eq!(server.registry().len(), 1);
        let welcome = recv(&mut client).await;
        assert_eq!(welcome["message"], "New client 127.0.0.1 joined");
        assert_eq!(welcome["message_type"], "chat-connection-ack");
    }

    #[tokio::test]
    async fn test_default_policy_broadcasts() {
        let mut server = server(Broadcast).await;
        let mut a = join(&mut server).await;
        let mut b = join(&mut server).await;
        recv(&mut a).await;
        recv(&mut b).await;

        send(&mut a, json!({"text": "hi"})).await;
        server.tick().await;

        assert_eq!(recv(&mut a).await, json!({"text": "hi"}));
        assert_eq!(recv(&mut b).await, json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn test_session_identification_and_routing() {
        let mut server = server(SessionRouter).await;
        let mut a = join(&mut server).await;
        let mut b = join(&mut server).await;
        recv(&mut a).await;
        recv(&mut b).await;

        send(&mut a, json!({"session": "alpha"})).await;
        server.tick().await;
        assert_eq!(recv(&mut a).await["message_type"], "identified");

        send(&mut b, json!({"session": "beta"})).await;
        server.tick().await;
        assert_eq!(recv(&mut b).await["message_type"], "identified");

        let ids: Vec<_> = server.registry().all().map(Connection::id).collect();
        assert_eq!(
            server.registry().matching(&Identity::new().with("session", "beta")),
            vec![ids[1]]
        );

        send(&mut a, json!({"to": "beta", "body": "ping"})).await;
        server.tick().await;

        let got = recv(&mut b).await;
        assert_eq!(got["body"], "ping");
        assert_eq!(got["from"], json!(ids[0].get()));
    }

    #[tokio::test]
    async fn test_rejected_identification_can_retry() {
        let mut server = server(SessionRouter).await;
        let mut a = join(&mut server).await;
        recv(&mut a).await;

        send(&mut a, json!({"hello": "there"})).await;
        server.tick().await;
        assert_eq!(recv(&mut a).await["message"], "missing session");
        assert!(!server.registry().all().next().unwrap().is_identified());

        send(&mut a, json!({"session": "s"})).await;
        server.tick().await;
        assert_eq!(recv(&mut a).await["message_type"], "identified");
        assert!(server.registry().all().next().unwrap().is_identified());
    }

    #[tokio::test]
    async fn test_one_frame_per_tick() {
        let mut server = server(Broadcast).await;
        let mut a = join(&mut server).await;
        recv(&mut a).await;

        let mut data = seal_masked(b"{\"n\":1}", random_mask());
        data.extend(seal_masked(b"{\"n\":2}", random_mask()));
        a.write_all(&data).await.unwrap();

        server.tick().await;
        assert_eq!(recv(&mut a).await, json!({"n": 1}));
        assert!(server.registry().all().next().unwrap().has_buffered_frame());

        server.tick().await;
        assert_eq!(recv(&mut a).await, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_closed_peer_is_removed() {
        let mut server = server(Broadcast).await;
        let client = join(&mut server).await;
        assert_eq!(server.registry().len(), 1);

        drop(client);
        tick_until(&mut server, |s| s.registry().is_empty()).await;
    }

    #[tokio::test]
    async fn test_disconnect_notice_when_enabled() {
        let config = Config::new()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_poll_timeout(Duration::from_secs(2))
            .with_notify_disconnect(true);
        let mut server = Server::bind(config, Broadcast).await.unwrap();
        let mut a = join(&mut server).await;
        let b = join(&mut server).await;
        recv(&mut a).await;

        drop(b);
        tick_until(&mut server, |s| s.registry().len() == 1).await;

        let notice = recv(&mut a).await;
        assert_eq!(notice["message"], "Client 127.0.0.1 disconnected");
    }

    #[tokio::test]
    async fn test_reset_peer_does_not_stop_fan_out() {
        let mut server = server(Broadcast).await;
        let mut a = join(&mut server).await;
        let mut b = join(&mut server).await;
        let reset = join(&mut server).await;
        recv(&mut a).await;
        recv(&mut b).await;

        #[allow(deprecated)]
        reset.set_linger(Some(Duration::ZERO)).unwrap();
        drop(reset);
        send(&mut a, json!({"n": 1})).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        tick_until(&mut server, |s| s.registry().len() == 2).await;
        assert_eq!(recv(&mut a).await, json!({"n": 1}));
        assert_eq!(recv(&mut b).await, json!({"n": 1}));

        send(&mut b, json!({"n": 2})).await;
        server.tick().await;
        assert_eq!(recv(&mut a).await, json!({"n": 2}));
        assert_eq!(recv(&mut b).await, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_partial_write_removes_recipient() {
        let config = Config::new()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_poll_timeout(Duration::from_millis(50))
            .with_read_buffer_size(1 << 20)
            .with_limits(Limits::new(32 << 20, 8192))
            .with_timeouts(Timeouts::new(Duration::from_secs(5), Duration::from_millis(300)));
        let mut server = Server::bind(config, Broadcast).await.unwrap();
        let mut stalled = join(&mut server).await;
        recv(&mut stalled).await;

        // Echoed back to a sender that never reads, so the write stalls midway.
        let body = json!({"text": "x".repeat(24 << 20)}).to_string();
        let frame = seal_masked(body.as_bytes(), random_mask());
        let serve = async {
            for _ in 0..5000 {
                if server.registry().is_empty() {
                    break;
                }
                server.tick().await;
            }
        };
        let (written, ()) = tokio::join!(stalled.write_all(&frame), serve);
        written.unwrap();
        assert!(server.registry().is_empty());

        let mut received = 0;
        let mut buf = vec![0u8; 1 << 16];
        let drained = tokio::time::timeout(Duration::from_secs(10), async {
            while let Ok(n @ 1..) = stalled.read(&mut buf).await {
                received += n;
            }
        });
        drained.await.unwrap();
        assert!(received < body.len());
    }

    #[tokio::test]
    async fn test_unmasked_frame_disconnects() {
        let mut server = server(Broadcast).await;
        let mut a = join(&mut server).await;
        recv(&mut a).await;

        a.write_all(&seal(b"{}")).await.unwrap();
        server.tick().await;

        assert!(server.registry().is_empty());
        let mut buf = [0u8; 1];
        assert_eq!(a.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_handshake_is_not_registered() {
        let mut server = server(Broadcast).await;
        let addr = server.local_addr().unwrap();

        let client = async {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        };
        let (response, ()) = tokio::join!(client, server.tick());

        assert!(response.is_empty());
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_clears_registry() {
        let mut server = server(Broadcast).await;
        let mut client = join(&mut server).await;
        recv(&mut client).await;

        server.run_until(async {}).await.unwrap();
        assert!(server.registry().is_empty());

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }
}

//! Hub test server.
//!
//! Runs a [`Server`] on a dedicated thread with its own current-thread
//! runtime, so the event loop never shares a scheduler with the test.

use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::oneshot;
use wshub::{Config, Policy, Server};

pub struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Spawn a hub on an ephemeral loopback port.
    pub fn spawn<P, F>(make_policy: F) -> Self
    where
        P: Policy + 'static,
        F: FnOnce() -> P + Send + 'static,
    {
        Self::spawn_with(Config::new(), make_policy)
    }

    /// Spawn a hub with custom config; host and port are overridden.
    pub fn spawn_with<P, F>(config: Config, make_policy: F) -> Self
    where
        P: Policy + 'static,
        F: FnOnce() -> P + Send + 'static,
    {
        let config = config
            .with_host("127.0.0.1")
            .with_port(0)
            .with_poll_timeout(Duration::from_millis(5));
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let mut server = Server::bind(config, make_policy()).await.unwrap();
                addr_tx.send(server.local_addr().unwrap()).unwrap();
                server
                    .run_until(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .unwrap();
            });
        });

        let addr = addr_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("server did not start");

        Self {
            addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

//! # wshub - a WebSocket message hub over raw TCP
//!
//! `wshub` speaks the WebSocket wire protocol directly: it answers the HTTP
//! upgrade, seals and unseals frames itself, and routes decoded JSON messages
//! between connections from a single-threaded event loop.
//!
//! ## Features
//!
//! - **Frame codec** with all three length encodings and client masking
//! - **Connection registry** with per-connection identities
//! - **Pluggable routing** through the [`Policy`] trait: broadcast, reply to
//!   one connection, or send to every connection whose identity matches
//! - **One frame per socket per tick** so a chatty client cannot starve others
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wshub::{Config, Server, SessionRouter};
//!
//! # async fn run() -> wshub::Result<()> {
//! let config = Config::new().with_port(40000);
//! let mut server = Server::bind(config, SessionRouter).await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Writing a policy
//!
//! ```rust,no_run
//! use wshub::{Connection, Message, Outbox, Policy};
//!
//! struct Echo;
//!
//! impl Policy for Echo {
//!     fn receive(&mut self, conn: &Connection, message: Message, out: &mut Outbox) {
//!         out.reply(conn.id(), message);
//!     }
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;

#[cfg(feature = "async-tokio")]
pub mod server;

pub use config::{Config, Limits, Timeouts};
pub use connection::ConnectionState;
#[cfg(feature = "async-tokio")]
pub use connection::{Connection, ConnectionId, Registry};
pub use error::{Error, FrameDecodeError, HandshakeError, IdentificationRejected, Result};
pub use message::{Identity, Message};
pub use protocol::{
    HandshakeRequest, HandshakeResponse, WS_GUID, compute_accept_key, seal, seal_masked, unseal,
};

#[cfg(feature = "async-tokio")]
pub use server::{
    Broadcast, ChatRoom, Envelope, Identified, Outbox, Policy, SessionRouter, Server, Target,
};

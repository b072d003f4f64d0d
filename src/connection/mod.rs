//! Connection bookkeeping.
//!
//! A [`Connection`] owns one upgraded socket, its read buffer and the identity
//! a routing policy has attached to it. The [`Registry`] holds every live
//! connection in registration order.
//!
//! ## Connection Lifecycle
//!
//! 1. **HandshakePending** - socket accepted, upgrade not finished
//! 2. **Unidentified** - registered with an empty identity
//! 3. **Identified** - a policy accepted its identification
//! 4. **Removed** - socket closed and dropped from the registry

mod state;

pub use state::ConnectionState;

#[cfg(feature = "async-tokio")]
#[allow(clippy::module_inception)]
mod connection;
#[cfg(feature = "async-tokio")]
mod registry;

#[cfg(feature = "async-tokio")]
pub(crate) use connection::Inbound;
#[cfg(feature = "async-tokio")]
pub use connection::{Connection, ConnectionId};
#[cfg(feature = "async-tokio")]
pub use registry::Registry;

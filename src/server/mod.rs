//! The hub itself: event loop, routing policies and the outbound queue they
//! fill.

mod outbox;
pub mod policy;
mod reactor;

pub use outbox::{Envelope, Outbox, Target};
pub use policy::{Broadcast, ChatRoom, Identified, Policy, SessionRouter};
pub use reactor::Server;

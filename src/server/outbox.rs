//! Outbound message queue filled by routing policies.

use std::mem;

use crate::connection::ConnectionId;
use crate::message::{Identity, Message};

/// Who a queued message goes to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Every registered connection, identified or not.
    Broadcast,
    /// One connection.
    Connection(ConnectionId),
    /// Every connection whose identity matches the criteria.
    Matching(Identity),
}

/// A queued message and its target.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Recipients, resolved against the registry at delivery time.
    pub target: Target,
    /// The message, sealed once however many recipients it has.
    pub message: Message,
}

/// Messages a hook wants delivered.
///
/// The server delivers the queue after the hook returns, in the order the
/// messages were queued.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Envelope>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `message` for `target`.
    pub fn send(&mut self, message: Message, target: Target) {
        self.queue.push(Envelope { target, message });
    }

    /// Queue `message` for every connection.
    pub fn broadcast(&mut self, message: Message) {
        self.send(message, Target::Broadcast);
    }

    /// Queue `message` for one connection.
    pub fn reply(&mut self, id: ConnectionId, message: Message) {
        self.send(message, Target::Connection(id));
    }

    /// Queue `message` for connections whose identity matches `criteria`.
    pub fn to_matching(&mut self, criteria: Identity, message: Message) {
        self.send(message, Target::Matching(criteria));
    }

    /// Take everything queued so far.
    pub fn drain(&mut self) -> Vec<Envelope> {
        mem::take(&mut self.queue)
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

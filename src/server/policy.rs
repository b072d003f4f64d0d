//! Routing policies.
//!
//! A [`Policy`] decides what happens when a connection arrives, identifies
//! itself, sends a message or goes away. Hooks never write to sockets
//! directly; they queue messages on an [`Outbox`] which the server delivers
//! once the hook returns.
//!
//! ## Provided policies
//!
//! - [`Broadcast`] - every hook keeps its default behavior
//! - [`SessionRouter`] - identification by `session`, delivery by `to`
//! - [`ChatRoom`] - `chat_user`/`chat_message` chat box

use serde_json::Value;
use tracing::debug;

use crate::connection::Connection;
use crate::error::IdentificationRejected;
use crate::message::{Identity, Message};
use crate::server::outbox::Outbox;

/// Message kind for join and leave notices.
pub const CONNECTION_ACK: &str = "chat-connection-ack";

/// Message kind for chat box lines.
pub const CHAT_BOX_HTML: &str = "chat-box-html";

/// Message kind for errors sent back to a client.
pub const ERROR: &str = "error";

/// Message kind confirming an accepted identification.
pub const IDENTIFIED: &str = "identified";

/// Result of an accepted identification.
#[derive(Debug, Clone, PartialEq)]
pub struct Identified {
    /// Attributes merged into the connection's identity.
    pub identity: Identity,
    /// Whether the identifying message also goes to [`Policy::receive`].
    pub forward: bool,
}

impl Identified {
    /// Accept with `identity`, without forwarding.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            forward: false,
        }
    }

    /// Also pass the identifying message to `receive`.
    #[must_use]
    pub fn forwarding(mut self) -> Self {
        self.forward = true;
        self
    }
}

/// Hooks the server calls as connections come, talk and go.
///
/// Every method has a default, so an implementation overrides only what it
/// needs.
pub trait Policy {
    /// A connection finished its handshake and was registered.
    ///
    /// Default: greets that connection only.
    fn welcome(&mut self, conn: &Connection, out: &mut Outbox) {
        out.reply(conn.id(), joined(conn));
    }

    /// First message from a connection that has not been identified yet.
    ///
    /// Returning an error leaves the connection unidentified so its next
    /// message is offered here again. The hook sends any error response
    /// itself.
    ///
    /// Default: accepts with an empty identity and forwards the message.
    fn identify(
        &mut self,
        conn: &Connection,
        message: &Message,
        out: &mut Outbox,
    ) -> Result<Identified, IdentificationRejected> {
        let _ = (conn, message, out);
        Ok(Identified::new(Identity::new()).forwarding())
    }

    /// A message from an identified connection.
    ///
    /// Default: broadcasts it unchanged.
    fn receive(&mut self, conn: &Connection, message: Message, out: &mut Outbox) {
        let _ = conn;
        out.broadcast(message);
    }

    /// A connection was removed. Only called when disconnect notification is
    /// enabled in the server's config.
    ///
    /// Default: tells everyone left.
    fn disconnect(&mut self, conn: &Connection, out: &mut Outbox) {
        out.broadcast(Message::typed(
            CONNECTION_ACK,
            format!("Client {} disconnected", conn.ip()),
        ));
    }
}

fn joined(conn: &Connection) -> Message {
    Message::typed(CONNECTION_ACK, format!("New client {} joined", conn.ip()))
}

fn error(text: &str) -> Message {
    Message::typed(ERROR, text)
}

/// Default hooks throughout: greet, accept everyone, broadcast everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Broadcast;

impl Policy for Broadcast {}

/// Point-to-point routing between identified sessions.
///
/// The first message must carry a string `session`. After that every message
/// needs a `to`: either criteria matched against identities, or a string
/// meaning `{"session": to}`. Delivered messages are stamped with the
/// sender's id under `from`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionRouter;

impl SessionRouter {
    /// Field a client identifies with.
    pub const SESSION_KEY: &'static str = "session";
    /// Field naming a message's recipients.
    pub const TO_KEY: &'static str = "to";
    /// Field stamped with the sender's id on delivery.
    pub const FROM_KEY: &'static str = "from";
    /// Field carrying a connection's own id in acknowledgements.
    pub const ID_KEY: &'static str = "id";

    fn criteria(to: &Value) -> Option<Identity> {
        match to {
            Value::String(session) if !session.is_empty() => {
                Some(Identity::new().with(Self::SESSION_KEY, session.as_str()))
            }
            Value::Object(map) if !map.is_empty() => Some(Identity::from(map.clone())),
            _ => None,
        }
    }
}

impl Policy for SessionRouter {
    fn welcome(&mut self, conn: &Connection, out: &mut Outbox) {
        out.reply(conn.id(), joined(conn).with(Self::ID_KEY, conn.id().get()));
    }

    fn identify(
        &mut self,
        conn: &Connection,
        message: &Message,
        out: &mut Outbox,
    ) -> Result<Identified, IdentificationRejected> {
        let Some(session) = message.get_str(Self::SESSION_KEY) else {
            out.reply(conn.id(), error("missing session"));
            return Err(IdentificationRejected::new("missing session"));
        };

        out.reply(
            conn.id(),
            Message::new()
                .with(crate::message::MESSAGE_TYPE_KEY, IDENTIFIED)
                .with(Self::ID_KEY, conn.id().get())
                .with(Self::SESSION_KEY, session),
        );
        Ok(Identified::new(
            Identity::new().with(Self::SESSION_KEY, session),
        ))
    }

    fn receive(&mut self, conn: &Connection, mut message: Message, out: &mut Outbox) {
        let criteria = match message.get(Self::TO_KEY) {
            None => {
                out.reply(conn.id(), error("missing to"));
                return;
            }
            Some(to) => match Self::criteria(to) {
                Some(criteria) => criteria,
                None => {
                    out.reply(conn.id(), error("invalid to"));
                    return;
                }
            },
        };

        message.insert(Self::FROM_KEY, conn.id().get());
        out.to_matching(criteria, message);
    }
}

/// The classic chat box: joins, lines of chat and leaves all go to everyone.
///
/// Chat messages carry `chat_user` and `chat_message`; anything else is
/// dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatRoom;

impl ChatRoom {
    pub const USER_KEY: &'static str = "chat_user";
    pub const TEXT_KEY: &'static str = "chat_message";
}

impl Policy for ChatRoom {
    fn welcome(&mut self, conn: &Connection, out: &mut Outbox) {
        out.broadcast(joined(conn));
    }

    fn receive(&mut self, conn: &Connection, message: Message, out: &mut Outbox) {
        match (
            message.get_str(Self::USER_KEY),
            message.get_str(Self::TEXT_KEY),
        ) {
            (Some(user), Some(text)) => {
                out.broadcast(Message::typed(CHAT_BOX_HTML, format!("{user}: {text}\n")));
            }
            _ => debug!(conn = %conn.id(), "dropping message without chat fields"),
        }
    }
}

//! Application messages and connection identities.
//!
//! Both are JSON objects. A [`Message`] is what a client sent or what the hub
//! sends back; an [`Identity`] is the attribute set a connection acquires when
//! a routing policy accepts its identification.

use serde_json::{Map, Value};
use std::fmt;

/// Key used to wrap payloads that are not JSON objects.
pub const MESSAGE_KEY: &str = "message";

/// Key carrying the kind of a message the hub generates.
pub const MESSAGE_TYPE_KEY: &str = "message_type";

/// A decoded application message: a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Create an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame payload.
    ///
    /// A payload starting with `{` that parses as a JSON object becomes that
    /// object. Anything else is wrapped as `{"message": <text>}`, with
    /// invalid UTF-8 replaced lossily.
    ///
    /// # Example
    ///
    /// ```
    /// use wshub::Message;
    ///
    /// let msg = Message::decode(b"{\"session\":\"abc\"}");
    /// assert_eq!(msg.get_str("session"), Some("abc"));
    ///
    /// let msg = Message::decode(b"hello");
    /// assert_eq!(msg.get_str("message"), Some("hello"));
    /// ```
    #[must_use]
    pub fn decode(payload: &[u8]) -> Self {
        if payload.first() == Some(&b'{') {
            if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(payload) {
                return Self(map);
            }
        }
        Self::text(String::from_utf8_lossy(payload))
    }

    /// Wrap plain text as `{"message": text}`.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new().with(MESSAGE_KEY, text.into())
    }

    /// A hub-generated message: `{"message": text, "message_type": kind}`.
    #[must_use]
    pub fn typed(kind: &str, text: impl Into<String>) -> Self {
        Self::text(text).with(MESSAGE_TYPE_KEY, kind)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Get a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a field if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Borrow the underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Encode as a JSON object string.
    #[must_use]
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// Attributes attached to a connection once it has identified itself.
///
/// Ordered by key. An empty identity means the connection has not been
/// identified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity(Map<String, Value>);

impl Identity {
    /// Create an empty identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether no attributes are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge `other` into `self`; attributes in `other` win.
    pub fn merge(&mut self, other: Identity) {
        self.0.extend(other.0);
    }

    /// Whether this identity satisfies `criteria`.
    ///
    /// True when the identity is non-empty and holds every key of `criteria`
    /// with an equal value. An empty identity never matches, even empty
    /// criteria.
    ///
    /// # Example
    ///
    /// ```
    /// use wshub::Identity;
    ///
    /// let identity = Identity::new().with("session", "abc").with("room", "1");
    /// assert!(identity.matches(&Identity::new().with("session", "abc")));
    /// assert!(!identity.matches(&Identity::new().with("session", "xyz")));
    /// assert!(!Identity::new().matches(&Identity::new()));
    /// ```
    #[must_use]
    pub fn matches(&self, criteria: &Identity) -> bool {
        !self.is_empty()
            && criteria
                .0
                .iter()
                .all(|(key, value)| self.0.get(key) == Some(value))
    }
}

impl From<Map<String, Value>> for Identity {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Identity> for Value {
    fn from(identity: Identity) -> Self {
        Value::Object(identity.0)
    }
}

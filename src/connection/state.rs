//! Connection lifecycle states.

/// Lifecycle of a client connection.
///
/// Transitions only move forward:
/// `HandshakePending → Unidentified → Identified → Removed`.
/// A connection may also go straight from `Unidentified` to `Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Socket accepted, upgrade exchange not yet finished.
    #[default]
    HandshakePending,
    /// Registered, no identification accepted yet.
    Unidentified,
    /// A routing policy accepted the connection's identification.
    Identified,
    /// Socket closed and dropped from the registry.
    Removed,
}

impl ConnectionState {
    /// Check if the connection is registered and pollable.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Unidentified | ConnectionState::Identified
        )
    }

    /// Check if identification has been accepted.
    #[must_use]
    #[inline]
    pub const fn is_identified(&self) -> bool {
        matches!(self, ConnectionState::Identified)
    }

    /// Check whether moving to `next` is a legal forward transition.
    #[must_use]
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        match (self, next) {
            (ConnectionState::HandshakePending, ConnectionState::Unidentified) => true,
            (ConnectionState::Unidentified, ConnectionState::Identified) => true,
            (ConnectionState::Removed, _) => false,
            (_, ConnectionState::Removed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::HandshakePending => write!(f, "HandshakePending"),
            ConnectionState::Unidentified => write!(f, "Unidentified"),
            ConnectionState::Identified => write!(f, "Identified"),
            ConnectionState::Removed => write!(f, "Removed"),
        }
    }
}

use std::collections::BTreeMap;
use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::debug;

use crate::connection::{Connection, ConnectionId};
use crate::message::Identity;

/// The set of live connections, keyed by id.
///
/// Iteration follows id order, which is registration order. A removed id is
/// never handed out again.
#[derive(Debug, Default)]
pub struct Registry {
    connections: BTreeMap<ConnectionId, Connection>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upgraded socket with an empty identity.
    pub fn register(&mut self, stream: TcpStream, addr: SocketAddr) -> ConnectionId {
        self.register_with_buffer(stream, addr, &[])
    }

    /// Register an upgraded socket together with bytes the peer sent after
    /// its upgrade request.
    pub fn register_with_buffer(
        &mut self,
        stream: TcpStream,
        addr: SocketAddr,
        buffered: &[u8],
    ) -> ConnectionId {
        let mut conn = Connection::new(stream, addr, buffered);
        conn.activate();
        let id = conn.id();
        debug!(conn = %id, peer = %addr, "registered connection");
        self.connections.insert(id, conn);
        id
    }

    /// Merge `identity` into the connection's identity and mark it identified.
    ///
    /// Returns `false` if no such connection is registered.
    pub fn set_identity(&mut self, id: ConnectionId, identity: Identity) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) => {
                conn.identify(identity);
                true
            }
            None => false,
        }
    }

    /// Close the connection's socket and drop it from the registry.
    ///
    /// Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let mut conn = self.connections.remove(&id)?;
        conn.close();
        debug!(conn = %id, peer = %conn.addr(), "removed connection");
        Some(conn)
    }

    /// Look up a connection.
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Whether the id is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// All live connections in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Snapshot of all live ids in registration order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Connections satisfying `pred`, in registration order.
    pub fn find<'a, F>(&'a self, mut pred: F) -> impl Iterator<Item = &'a Connection> + 'a
    where
        F: FnMut(&Connection) -> bool + 'a,
    {
        self.connections.values().filter(move |conn| pred(*conn))
    }

    /// Ids of connections whose identity matches `criteria`.
    ///
    /// Unidentified connections never match.
    pub fn matching(&self, criteria: &Identity) -> Vec<ConnectionId> {
        self.find(|conn| conn.identity().matches(criteria))
            .map(Connection::id)
            .collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close and drop every connection.
    pub fn clear(&mut self) {
        for id in self.ids() {
            self.remove(id);
        }
    }
}

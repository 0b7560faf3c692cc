//! Connection Management
//!
//! Tracks live WebSocket connections and enforces the connection cap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::ServerError;

/// Per-connection bookkeeping.
pub struct Connection {
    /// Connection ID
    pub id: String,
    /// Accept time
    pub connected_at: Instant,
    /// Last inbound activity
    last_activity: RwLock<Instant>,
    /// Inbound messages handled
    messages: RwLock<u64>,
}

impl Connection {
    fn new(id: String) -> Self {
        Self {
            id,
            connected_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
            messages: RwLock::new(0),
        }
    }

    /// Record an inbound message.
    pub fn record_message(&self) {
        *self.messages.write() += 1;
        *self.last_activity.write() = Instant::now();
    }

    /// Inbound messages handled so far.
    pub fn message_count(&self) -> u64 {
        *self.messages.read()
    }

    /// Time since the last inbound message.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Register a new connection; refuses past capacity.
    pub fn register(&self) -> Result<Arc<Connection>, ServerError> {
        let mut connections = self.connections.write();

        if connections.len() >= self.max_connections {
            return Err(ServerError::Connection("max connections reached".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let connection = Arc::new(Connection::new(id.clone()));
        connections.insert(id, connection.clone());

        tracing::info!(total = connections.len(), "connection registered");
        Ok(connection)
    }

    /// Remove a connection by ID.
    pub fn remove(&self, id: &str) {
        let mut connections = self.connections.write();
        if connections.remove(id).is_some() {
            tracing::info!(total = connections.len(), "connection removed");
        }
    }

    /// Active connection count.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }
}

//! Connections between stage outputs and stage inputs.

use crate::core::error::{ConnectionId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a connection: a stage and a port index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// The stage.
    pub node_id: NodeId,
    /// Output index on the producer, input index on the consumer.
    pub port: usize,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(node_id: NodeId, port: usize) -> Self {
        Self { node_id, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_id, self.port)
    }
}

/// A data edge from a producer output to a consumer input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Unique identifier for this connection.
    pub id: ConnectionId,
    /// Producer output.
    pub from: Endpoint,
    /// Consumer input.
    pub to: Endpoint,
}

impl Connection {
    /// Create a new connection.
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self {
            id: ConnectionId::new(),
            from,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_endpoints() {
        let producer = NodeId::new();
        let consumer = NodeId::new();
        let conn = Connection::new(Endpoint::new(producer, 2), Endpoint::new(consumer, 0));

        assert_eq!(conn.from.node_id, producer);
        assert_eq!(conn.from.port, 2);
        assert_eq!(conn.to, Endpoint::new(consumer, 0));
        assert!(conn.to.to_string().ends_with(":0"));
    }
}

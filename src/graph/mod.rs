//! Pipeline graph management.
//!
//! A pipeline is a directed acyclic graph where nodes are processing stages
//! and edges carry data containers from a producer output to a consumer input.

pub mod connection;
pub mod structure;
pub mod topology;

// Re-export commonly used types
pub use connection::{Connection, Endpoint};
pub use structure::{Pipeline, StageNode};
pub use topology::TopologyAnalyzer;

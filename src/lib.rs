//! Burrow
//!
//! Kademlia-style peer discovery and routing over UDP: a 160-bit
//! identifier space, an XOR-distance indexed routing table of k-buckets,
//! and an iterative lookup protocol that locates the network contacts
//! closest to an arbitrary target ID.
//!
//! ## Features
//! - Async First: a fully asynchronous stack based on tokio and futures.
//! - Bounded lookups: alpha-wide rounds with a queried set and a hard
//!   round cap, so the search terminates on any contact graph.
//! - Liveness-based eviction: a full bucket only drops its
//!   least-recently-seen contact after it fails a PING probe.
//! - Modularity: run the ready-made server binary, or wire
//!   [`node::BurrowNode`] into your own process.

/// Configuration Module
pub mod config;
/// Burrow Exceptions Module
pub mod exceptions;
/// Module for logging and registration of events
pub mod logger;

/// Kademlia routing and lookup realization
pub mod dht;
/// Network layer: wire protocol and UDP transport
pub mod network;
/// The assembled node: identity, table, RPC service, join sequence
pub mod node;

pub use config::Config;
pub use dht::node::{Contact, NodeID};
pub use dht::protocol::{DhtProtocol, LookupResult, RpcClient};
pub use dht::routing_table::RoutingTable;
pub use exceptions::{BurrowError, DhtError, NetworkError, Result};
pub use node::BurrowNode;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::exceptions::{NetworkError, Result};

/// Length in bytes of a node ID.
pub const ID_LENGTH: usize = 20;

/// Length in bits of a node ID, and the number of routing table buckets.
pub const ID_BITS: usize = ID_LENGTH * 8;

/// 160-bit identifier naming a participant in the network
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeID(pub [u8; ID_LENGTH]);

impl NodeID {
    pub fn new(id: [u8; ID_LENGTH]) -> Self {
        Self(id)
    }

    /// Generate a fresh random ID from the OS entropy source.
    ///
    /// Uniqueness is probabilistic; the 160-bit space makes collisions
    /// negligible.
    pub fn generate() -> Self {
        let mut id = [0u8; ID_LENGTH];
        OsRng.fill_bytes(&mut id);
        Self(id)
    }

    /// The all-zero ID, used as a placeholder for a bootstrap contact
    /// whose real ID is not known yet.
    pub fn zero() -> Self {
        Self([0u8; ID_LENGTH])
    }

    /// XOR distance to another ID, as a big-endian unsigned integer.
    ///
    /// Byte arrays compare lexicographically, which for fixed-length
    /// big-endian values is exactly integer order.
    pub fn distance_to(&self, other: &NodeID) -> [u8; ID_LENGTH] {
        let mut distance = [0u8; ID_LENGTH];
        for (i, d) in distance.iter_mut().enumerate() {
            *d = self.0[i] ^ other.0[i];
        }
        distance
    }
}

impl fmt::Debug for NodeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_id = hex::encode(self.0);
        write!(f, "NodeID({}...)", &hex_id[..16])
    }
}

/// Number of leading zero bits of an XOR distance, 0..=160.
///
/// Used directly as a bucket index; the value 160 only occurs for the
/// self-distance, which is never assigned a bucket.
pub fn common_prefix_length(distance: &[u8; ID_LENGTH]) -> usize {
    for (i, byte) in distance.iter().enumerate() {
        if *byte != 0 {
            return i * 8 + byte.leading_zeros() as usize;
        }
    }
    ID_BITS
}

/// How to reach a node in the network: its ID plus a network address.
///
/// Immutable value; liveness is a property of the routing table entry,
/// not of the contact itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "NodeID")]
    pub node_id: NodeID,
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "Port")]
    pub port: String,
}

impl Contact {
    pub fn new(node_id: NodeID, ip: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node_id,
            ip: ip.into(),
            port: port.into(),
        }
    }

    pub fn from_addr(node_id: NodeID, addr: SocketAddr) -> Self {
        Self {
            node_id,
            ip: addr.ip().to_string(),
            port: addr.port().to_string(),
        }
    }

    /// Parse the stored `ip:port` pair into a socket address.
    pub fn address(&self) -> Result<SocketAddr> {
        let joined = format!("{}:{}", self.ip, self.port);
        joined
            .parse()
            .map_err(|_| NetworkError::BadAddress(joined).into())
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contact({:?}, {}:{})", self.node_id, self.ip, self.port)
    }
}

//! Message type bytes for the wire protocol
//!
//! Dispatch is an explicit match on these tags.

/// Liveness probe
pub const MSG_PING: u8 = 0x01;

/// Answer to a PING, confirming the node is alive
pub const MSG_PONG: u8 = 0x02;

/// Request for the contacts closest to a target ID
pub const MSG_FIND_NODE: u8 = 0x03;

/// Answer carrying the exact contact or the closest known contacts
pub const MSG_FIND_NODE_RESPONSE: u8 = 0x04;

/// Message type bytes for the wire protocol
pub mod consts;
/// Wire messages and the request/response RPC boundary (PING, FIND_NODE)
pub mod protocol;
/// UDP transport: bind, receive loop, send
pub mod transport;

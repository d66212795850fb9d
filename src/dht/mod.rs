/// Node identity: 160-bit IDs, the XOR metric, and network contacts
pub mod node;
/// Iterative lookup, join, and the contact admission policy
pub mod protocol;
/// K-buckets and the XOR-distance indexed routing table
pub mod routing_table;

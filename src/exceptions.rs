use thiserror::Error;

/// Root error for the burrow crate
#[derive(Error, Debug)]
pub enum BurrowError {
    #[error("DHT error: {0}")]
    Dht(#[from] DhtError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Errors from routing and lookup operations
#[derive(Error, Debug)]
pub enum DhtError {
    #[error("Node not found")]
    NodeNotFound,
}

/// Errors from the RPC and transport layer
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Peer unreachable")]
    Unreachable,

    #[error("Request timed out")]
    Timeout,

    #[error("Malformed or unsuccessful reply: {0}")]
    Protocol(String),

    #[error("Invalid peer address: {0}")]
    BadAddress(String),

    #[error("Socket bind failed")]
    Bind,

    #[error("Bootstrap process failed")]
    Bootstrap,

    #[error("General network error")]
    General,
}

/// Convenient Result type for the burrow crate
pub type Result<T> = std::result::Result<T, BurrowError>;

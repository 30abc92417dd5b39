//! Error types for the booking engine

use crate::types::SeatId;
use thiserror::Error;

/// Result type for booking operations
pub type Result<T> = std::result::Result<T, Error>;

/// Booking engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown event or booking ID
    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more requested seats are not available (business rejection)
    #[error("Seats unavailable: {seats:?}")]
    SeatUnavailable {
        /// The requested seats that were not available
        seats: Vec<SeatId>,
    },

    /// Requested units exceed remaining capacity (business rejection)
    #[error("Insufficient capacity: requested {requested}, remaining {remaining}")]
    InsufficientCapacity {
        /// Units the caller asked for
        requested: u32,
        /// Units left at decision time
        remaining: u32,
    },

    /// Internal invariant breach detected by the inventory store.
    /// Never expected in normal operation; the request is aborted with
    /// no partial state committed.
    #[error("Capacity violation: {0}")]
    CapacityViolation(String),

    /// Attempted release on a booking that is not Confirmed
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Per-event exclusive access could not be acquired within the
    /// configured wait. Retryable with the same idempotency token.
    #[error("Event busy, retry with the same idempotency token")]
    Busy,

    /// Malformed request (zero units, empty seat list, duplicate publish)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may retry the same request (with the same
    /// idempotency token) and expect it to eventually succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy | Error::Storage(_) | Error::Concurrency(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Busy.is_retryable());
        assert!(Error::Storage("disk full".to_string()).is_retryable());
        assert!(!Error::SeatUnavailable { seats: vec![] }.is_retryable());
        assert!(!Error::InsufficientCapacity { requested: 2, remaining: 1 }.is_retryable());
        assert!(!Error::NotFound("evt".to_string()).is_retryable());
    }
}

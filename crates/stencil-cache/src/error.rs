//! Cache-related error types

use thiserror::Error;

/// Failures raised by the cache itself rather than by a producer
///
/// Producer errors are carried through unchanged; these variants only cover
/// what can go wrong around a production (a panicking producer, an impatient
/// waiter). Error types used with [`SingleFlightCache`](crate::SingleFlightCache)
/// must be constructible from this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Producer for key {key} aborted: {reason}")]
    ProducerAborted { key: String, reason: String },

    #[error("Timed out after {waited_ms}ms waiting for key {key}")]
    TimedOut { key: String, waited_ms: u64 },
}

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, CacheError>;

//! # Stencil Cache
//!
//! Concurrent memoization for the Stencil template runtime.
//!
//! ## Features
//!
//! - **Single-flight production**: at most one producer run per key, shared by
//!   every concurrent requester
//! - **No poison entries**: failed productions are reported to all waiters and
//!   evicted, so the next lookup retries
//! - **Cancellation-safe**: producers run on their own task; dropping or timing
//!   out a waiter never aborts the production
//! - **Targeted invalidation**: `invalidate_if` evicts only the exact stale
//!   value a caller observed
//! - **Performance monitoring**: lock-free counters and serializable snapshots

pub mod cache;
pub mod error;
pub mod metrics;

pub use cache::{FnProducer, Producer, Production, SingleFlightCache};
pub use error::CacheError;
pub use metrics::{CacheMetrics, CacheStats};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, CacheError>;

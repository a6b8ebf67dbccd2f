//! Error types for the cache
//!
//! Provides unified error handling using thiserror. None of these reach the
//! public operations: they are logged, and callers observe an absent result
//! or a declined write.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache internals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The dispatcher task is gone and can no longer accept work
    #[error("cache worker stopped before accepting {0}")]
    WorkerStopped(&'static str),

    /// The work was accepted but its completion signal was dropped
    #[error("cache worker dropped {0} before completing it")]
    Abandoned(&'static str),

    /// Storing an entry of this cost would overflow the cost total
    #[error("entry cost {0} would overflow the total cost")]
    CostOverflow(u64),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

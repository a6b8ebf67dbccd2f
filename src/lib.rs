//! Mini Cache - An in-process object cache
//!
//! Concurrent key/value storage bounded by a total cost budget and an entry
//! age limit, with lifecycle hooks and a background age sweeper.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{CacheStats, HookKind, MemoryCache};
pub use config::Config;
pub use error::CacheError;

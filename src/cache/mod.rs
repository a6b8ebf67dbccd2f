//! Cache Module
//!
//! Provides an in-memory object cache bounded by total cost and entry age.

mod clock;
mod entry;
mod eviction;
mod gate;
mod hooks;
mod memory;
mod recency;
mod state;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use clock::{cutoff_for, Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use hooks::{make_hook, Hook, HookKind};
pub use memory::{CacheBuilder, MemoryCache};
pub use recency::RecencyIndex;
pub use stats::CacheStats;
pub use store::EntryStore;

pub(crate) use gate::{panic_message, Gate};
pub(crate) use hooks::Hooks;
pub(crate) use state::CacheState;
pub(crate) use stats::CacheCounters;
pub(crate) use memory::Shared;

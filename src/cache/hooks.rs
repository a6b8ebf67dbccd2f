//! Lifecycle Hooks Module
//!
//! Optional callbacks bracketing every insertion and removal.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::cache::{panic_message, MemoryCache};

/// Callback invoked with the cache, the key and the value.
///
/// Hooks run inside the exclusive write that performs the mutation. They must
/// not call the blocking API of the same cache; that waits on the write that
/// is running the hook and never returns. A panicking hook is logged and the
/// mutation goes ahead.
pub type Hook<V> = Arc<dyn Fn(&MemoryCache<V>, &str, Option<&Arc<V>>) + Send + Sync>;

/// Boxes a closure as a [`Hook`], fixing its argument types.
pub fn make_hook<V, F>(f: F) -> Hook<V>
where
    F: Fn(&MemoryCache<V>, &str, Option<&Arc<V>>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Which mutation a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before a value is stored; receives the new value
    WillAdd,
    /// After a value is stored; receives the new value
    DidAdd,
    /// Before an entry is removed; receives the value still present
    WillRemove,
    /// After an entry is removed; value is absent
    DidRemove,
}

// == Hooks ==
/// The four hook slots of a cache.
pub struct Hooks<V> {
    will_add: Option<Hook<V>>,
    did_add: Option<Hook<V>>,
    will_remove: Option<Hook<V>>,
    did_remove: Option<Hook<V>>,
}

impl<V> Default for Hooks<V> {
    fn default() -> Self {
        Self {
            will_add: None,
            did_add: None,
            will_remove: None,
            did_remove: None,
        }
    }
}

impl<V> fmt::Debug for Hooks<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("will_add", &self.will_add.is_some())
            .field("did_add", &self.did_add.is_some())
            .field("will_remove", &self.will_remove.is_some())
            .field("did_remove", &self.did_remove.is_some())
            .finish()
    }
}

impl<V> Hooks<V> {
    fn slot(&self, kind: HookKind) -> &Option<Hook<V>> {
        match kind {
            HookKind::WillAdd => &self.will_add,
            HookKind::DidAdd => &self.did_add,
            HookKind::WillRemove => &self.will_remove,
            HookKind::DidRemove => &self.did_remove,
        }
    }

    /// Returns the hook attached to `kind`, if any.
    pub fn get(&self, kind: HookKind) -> Option<Hook<V>> {
        self.slot(kind).clone()
    }

    /// Replaces the hook attached to `kind`; `None` detaches it.
    pub fn set(&mut self, kind: HookKind, hook: Option<Hook<V>>) {
        let slot = match kind {
            HookKind::WillAdd => &mut self.will_add,
            HookKind::DidAdd => &mut self.did_add,
            HookKind::WillRemove => &mut self.will_remove,
            HookKind::DidRemove => &mut self.did_remove,
        };
        *slot = hook;
    }

    /// Invokes the hook attached to `kind`, if one is set.
    ///
    /// Returns false if the hook panicked.
    pub fn fire(
        &self,
        kind: HookKind,
        cache: &MemoryCache<V>,
        key: &str,
        value: Option<&Arc<V>>,
    ) -> bool {
        let Some(hook) = self.slot(kind) else {
            return true;
        };
        match catch_unwind(AssertUnwindSafe(|| hook(cache, key, value))) {
            Ok(()) => true,
            Err(payload) => {
                warn!(?kind, key, panic = panic_message(&*payload), "Hook panicked");
                false
            }
        }
    }
}

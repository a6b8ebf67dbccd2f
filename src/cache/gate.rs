//! Concurrency Gate Module
//!
//! Many concurrent reads, one exclusive write at a time, writes applied in
//! the order they were submitted.
//!
//! All work is queued on one channel and a single dispatcher task drains it:
//! - a write waits for the lock's exclusive side and runs inline, so the next
//!   command is not looked at until it is done
//! - a read takes a shared guard and runs on the pool, so consecutive reads
//!   overlap but none of them can overlap a write queued behind it
//!
//! Callers get a [`Pending`] back and either await it or block on it. Nothing
//! is locked on the caller's side while it waits.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, warn};

use crate::cache::{CacheState, MemoryCache, Shared};
use crate::error::{CacheError, Result};

type ReadFn<V> = Box<dyn FnOnce(&MemoryCache<V>, &CacheState<V>) + Send>;
type WriteFn<V> = Box<dyn FnOnce(&MemoryCache<V>, &mut CacheState<V>) + Send>;

pub(crate) enum Command<V> {
    Read(ReadFn<V>),
    Write(WriteFn<V>),
}

// == Gate ==
/// Submission side of the dispatcher queue.
pub(crate) struct Gate<V> {
    tx: mpsc::UnboundedSender<Command<V>>,
}

impl<V> Clone for Gate<V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<V: Send + Sync + 'static> Gate<V> {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Command<V>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    // == Read ==
    /// Queues `f` to run with shared access.
    pub fn read<R, F>(&self, op: &'static str, f: F) -> Pending<R>
    where
        R: Send + 'static,
        F: FnOnce(&MemoryCache<V>, &CacheState<V>) -> R + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let command = Command::Read(Box::new(move |cache, state| {
            let _ = done.send(f(cache, state));
        }));
        self.submit(op, command, rx)
    }

    // == Write ==
    /// Queues `f` to run with exclusive access after every earlier write.
    pub fn write<R, F>(&self, op: &'static str, f: F) -> Pending<R>
    where
        R: Send + 'static,
        F: FnOnce(&MemoryCache<V>, &mut CacheState<V>) -> R + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let command = Command::Write(Box::new(move |cache, state| {
            let _ = done.send(f(cache, state));
        }));
        self.submit(op, command, rx)
    }

    fn submit<R>(&self, op: &'static str, command: Command<V>, rx: oneshot::Receiver<R>) -> Pending<R> {
        let rx = self
            .tx
            .send(command)
            .map(|_| rx)
            .map_err(|_| CacheError::WorkerStopped(op));
        Pending { op, rx }
    }
}

// == Pending ==
/// Completion signal for one queued command.
///
/// Dropping it does not cancel the command.
#[must_use = "dropping a Pending discards the result, not the operation"]
pub(crate) struct Pending<R> {
    op: &'static str,
    rx: Result<oneshot::Receiver<R>>,
}

impl<R> Pending<R> {
    /// A completion that is already resolved, for input rejected up front.
    pub fn ready(op: &'static str, value: R) -> Self {
        let (done, rx) = oneshot::channel();
        let _ = done.send(value);
        Self { op, rx: Ok(rx) }
    }

    pub async fn wait(self) -> Result<R> {
        let op = self.op;
        self.rx?.await.map_err(|_| CacheError::Abandoned(op))
    }

    /// Blocks the current thread until the command has run.
    ///
    /// # Panics
    /// Panics when called from within an async execution context.
    pub fn wait_blocking(self) -> Result<R> {
        let op = self.op;
        self.rx?.blocking_recv().map_err(|_| CacheError::Abandoned(op))
    }

    /// Like [`wait`](Self::wait) but logs failures and maps them to `None`.
    pub async fn outcome(self) -> Option<R> {
        log_failure(self.wait().await)
    }

    /// Like [`wait_blocking`](Self::wait_blocking) but logs failures and maps
    /// them to `None`.
    pub fn outcome_blocking(self) -> Option<R> {
        log_failure(self.wait_blocking())
    }
}

fn log_failure<R>(result: Result<R>) -> Option<R> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%err, "Cache operation did not complete");
            None
        }
    }
}

/// Text of a caught panic payload, for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

// == Dispatcher ==
/// Drains the command queue until it closes or the cache handle is gone.
///
/// Holds the owning handle only weakly; each command borrows a strong handle
/// for as long as it runs so hooks and callbacks can be given the cache.
///
/// A command that panics is logged and dropped, which its caller sees as an
/// abandoned operation. The dispatcher carries on with the next one.
pub(crate) async fn dispatch<V: Send + Sync + 'static>(
    mut rx: mpsc::UnboundedReceiver<Command<V>>,
    state: Arc<RwLock<CacheState<V>>>,
    owner: Weak<Shared<V>>,
) {
    debug!("Cache dispatcher started");

    while let Some(command) = rx.recv().await {
        let Some(cache) = MemoryCache::upgrade(&owner) else {
            break;
        };

        match command {
            Command::Write(f) => {
                let mut guard = state.write().await;
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(&cache, &mut *guard))) {
                    warn!(panic = panic_message(&*payload), "Cache write panicked");
                }
            }
            Command::Read(f) => {
                let guard = Arc::clone(&state).read_owned().await;
                tokio::spawn(async move {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(&cache, &*guard))) {
                        warn!(panic = panic_message(&*payload), "Cache read panicked");
                    }
                });
            }
        }
    }

    debug!("Cache dispatcher stopped");
}

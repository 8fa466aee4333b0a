//! Registry of suspended `/wait` transactions.
//!
//! This is the only state shared across execution contexts. Every read or
//! update happens under the single mutex, and the mutex is never held while
//! work is handed to another context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::context::{ContextEvent, ContextHandle};
use crate::transaction::TxnId;

/// Final body fragment a waiter receives when it is released.
pub const RELEASED_BODY: &str = "released\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("id {0} is already waiting")]
    DuplicateId(u32),
}

/// A suspended transaction, owned by its handler.
///
/// The registry only keeps a weak reference, so a torn-down handler can never
/// be reached through it.
#[derive(Debug)]
pub struct Waiter {
    id: u32,
    txn: TxnId,
    context: ContextHandle,
    claimed: AtomicBool,
}

impl Waiter {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Marks the waiter released; only the first caller wins.
    fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Outcome of waiting on a [`ReleaseCompletion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// The waiter received its final chunk and EOM.
    Done,
    /// Called on the waiter's own context: the completion is queued and runs
    /// once the current callback returns.
    Queued,
    /// The waiter's transaction was torn down before the completion could run.
    Gone,
}

/// Completion of a release, resolved once the waiter's final chunk and EOM
/// have been issued on its owning context.
#[must_use = "dropping the completion does not cancel the release"]
pub struct ReleaseCompletion {
    done: oneshot::Receiver<()>,
    on_owner: bool,
}

impl ReleaseCompletion {
    /// Waits asynchronously. Returns `false` if the waiter's transaction was
    /// torn down before the completion could run.
    pub async fn finished(self) -> bool {
        self.done.await.is_ok()
    }

    /// Blocks the calling thread until the completion has run.
    ///
    /// Must not be called from inside an async runtime. On the waiter's own
    /// context blocking would never end, so it returns [`Released::Queued`]
    /// at once.
    pub fn wait(self) -> Released {
        if self.on_owner {
            return Released::Queued;
        }
        match self.done.blocking_recv() {
            Ok(()) => Released::Done,
            Err(_) => Released::Gone,
        }
    }
}

#[derive(Debug, Default)]
pub struct WaitRegistry {
    waiters: Mutex<HashMap<u32, Weak<Waiter>>>,
}

impl WaitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Weak<Waiter>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers transaction `txn` of `context` as waiting on `id`.
    ///
    /// A live registration for the same id is rejected; an entry whose
    /// handler is already gone is replaced.
    pub fn register(
        &self,
        id: u32,
        txn: TxnId,
        context: ContextHandle,
    ) -> Result<Arc<Waiter>, RegistryError> {
        let mut waiters = self.lock();
        if waiters.get(&id).is_some_and(|w| w.strong_count() > 0) {
            return Err(RegistryError::DuplicateId(id));
        }
        let waiter = Arc::new(Waiter {
            id,
            txn,
            context,
            claimed: AtomicBool::new(false),
        });
        waiters.insert(id, Arc::downgrade(&waiter));
        debug!(id, %txn, "waiter registered");
        Ok(waiter)
    }

    /// Removes `waiter`'s entry if it is still the registered one.
    pub fn unregister(&self, waiter: &Arc<Waiter>) -> bool {
        let mut waiters = self.lock();
        let ours = waiters
            .get(&waiter.id)
            .is_some_and(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(waiter)));
        if ours {
            waiters.remove(&waiter.id);
            debug!(id = waiter.id, "waiter unregistered");
        }
        ours
    }

    pub fn contains(&self, id: u32) -> bool {
        self.lock().get(&id).is_some_and(|w| w.strong_count() > 0)
    }

    /// Number of live waiters.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases the waiter registered on `id`.
    ///
    /// Returns `None` when nothing is waiting on `id` (the wait may already
    /// have ended). Otherwise the final chunk and EOM are posted to the
    /// waiter's owning context; the entry is removed once they have run.
    pub fn release(self: &Arc<Self>, id: u32) -> Option<ReleaseCompletion> {
        let waiter = {
            let waiters = self.lock();
            let waiter = waiters.get(&id).and_then(Weak::upgrade)?;
            if !waiter.claim() {
                return None;
            }
            waiter
        };

        let registry = Arc::clone(self);
        let owned = Arc::clone(&waiter);
        let (event, done) = ContextEvent::acknowledged(waiter.txn, move |txn| {
            txn.send_body(Bytes::from_static(RELEASED_BODY.as_bytes()));
            txn.send_eom();
            registry.unregister(&owned);
        });

        if let Err(e) = waiter.context.post(event) {
            warn!(id, error = %e, "waiter's context is gone");
            self.unregister(&waiter);
            return None;
        }
        debug!(id, txn = %waiter.txn, "release handed to owning context");

        Some(ReleaseCompletion {
            done,
            on_owner: waiter.context.is_current(),
        })
    }

    /// Releases `id` and blocks until the completion has run on the waiter's
    /// context. `None` when nothing is waiting on `id`.
    pub fn release_blocking(self: &Arc<Self>, id: u32) -> Option<Released> {
        self.release(id).map(ReleaseCompletion::wait)
    }
}

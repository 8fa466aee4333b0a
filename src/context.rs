//! Owning execution contexts.
//!
//! Every connection runs its transactions inside one [`ExecutionContext`]: a
//! single task that is the only caller of its handlers. Other threads reach a
//! transaction by posting a [`ContextEvent`] through a [`ContextHandle`]; the
//! event runs on the owning context, between two handler callbacks.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};

use crate::transaction::{Transaction, TxnId};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Work addressed to one transaction of a context.
pub type Job = Box<dyn FnOnce(&mut dyn Transaction) + Send>;

/// A job plus its optional completion acknowledgement.
pub struct ContextEvent {
    target: TxnId,
    job: Job,
    ack: Option<oneshot::Sender<()>>,
}

impl ContextEvent {
    pub fn new(target: TxnId, job: impl FnOnce(&mut dyn Transaction) + Send + 'static) -> Self {
        Self {
            target,
            job: Box::new(job),
            ack: None,
        }
    }

    /// Like [`ContextEvent::new`], returning a receiver that fires once the job has run.
    pub fn acknowledged(
        target: TxnId,
        job: impl FnOnce(&mut dyn Transaction) + Send + 'static,
    ) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let event = Self {
            target,
            job: Box::new(job),
            ack: Some(tx),
        };
        (event, rx)
    }

    pub fn target(&self) -> TxnId {
        self.target
    }

    /// Runs the job against `txn` and acknowledges it.
    ///
    /// Dropping an event without running it drops the acknowledgement, which
    /// the waiting side observes as "the transaction is gone".
    pub fn run(self, txn: &mut dyn Transaction) {
        (self.job)(txn);
        if let Some(ack) = self.ack {
            let _ = ack.send(());
        }
    }
}

/// Posting side of an execution context. Cheap to clone, usable from any thread.
#[derive(Clone, Debug)]
pub struct ContextHandle {
    id: u64,
    tx: mpsc::UnboundedSender<ContextEvent>,
}

/// The context has shut down; the event was not delivered.
#[derive(Debug, thiserror::Error)]
#[error("execution context {0} is closed")]
pub struct ContextClosed(pub u64);

impl ContextHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the calling thread is currently dispatching inside this context.
    pub fn is_current(&self) -> bool {
        CURRENT.with(|current| current.get() == Some(self.id))
    }

    pub fn post(&self, event: ContextEvent) -> Result<(), ContextClosed> {
        self.tx.send(event).map_err(|_| ContextClosed(self.id))
    }
}

/// Receiving side of an execution context, owned by the task that drives it.
pub struct ExecutionContext {
    handle: ContextHandle,
    rx: mpsc::UnboundedReceiver<ContextEvent>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: ContextHandle {
                id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
                tx,
            },
            rx,
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Marks the calling thread as running inside this context until the guard drops.
    pub fn enter(&self) -> Entered {
        let prev = CURRENT.with(|current| current.replace(Some(self.handle.id)));
        Entered { prev }
    }

    pub async fn next_event(&mut self) -> Option<ContextEvent> {
        self.rx.recv().await
    }

    /// Returns a pending event without waiting.
    pub fn try_next_event(&mut self) -> Option<ContextEvent> {
        self.rx.try_recv().ok()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard returned by [`ExecutionContext::enter`].
pub struct Entered {
    prev: Option<u64>,
}

impl Drop for Entered {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.prev));
    }
}

//! Bounded FIFO queue of deferred operations.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::{
    CRITICAL_PRESSURE_MULTIPLIER, HIGH_PRESSURE_MULTIPLIER, QUEUE_CRITICAL_PRESSURE_PERCENTAGE,
    QUEUE_HIGH_PRESSURE_PERCENTAGE,
};
use crate::error_handling::QueueFullError;

type ErasedRun = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A caller's operation waiting for its turn in the drain loop.
///
/// The operation's outcome is forwarded to the caller through a one-shot
/// channel, so success and failure both reach the awaiting `enqueue_request`.
pub(crate) struct QueuedOperation {
    run: ErasedRun,
    enqueued_at: Instant,
}

impl QueuedOperation {
    pub(crate) fn new<F, Fut, T>(run: F, completion: oneshot::Sender<anyhow::Result<T>>) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        QueuedOperation {
            run: Box::new(move || {
                Box::pin(async move {
                    let outcome = run().await;
                    if completion.send(outcome).is_err() {
                        log::debug!("Caller stopped waiting for a queued request; outcome dropped");
                    }
                })
            }),
            enqueued_at: Instant::now(),
        }
    }

    /// Time spent in the queue so far.
    pub(crate) fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Runs the operation and delivers its outcome to the caller.
    pub(crate) async fn execute(self) {
        (self.run)().await
    }
}

/// FIFO queue that refuses to grow past its capacity.
pub(crate) struct RequestQueue {
    items: VecDeque<QueuedOperation>,
    capacity: usize,
}

impl RequestQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        RequestQueue {
            items: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Appends to the tail.
    ///
    /// # Errors
    ///
    /// Returns `QueueFullError` (and drops `operation` unrun) at capacity.
    pub(crate) fn push(&mut self, operation: QueuedOperation) -> Result<(), QueueFullError> {
        if self.is_full() {
            return Err(QueueFullError {
                capacity: self.capacity,
            });
        }
        self.items.push_back(operation);
        Ok(())
    }

    pub(crate) fn pop_front(&mut self) -> Option<QueuedOperation> {
        self.items.pop_front()
    }

    /// Removes every pending operation, handing them back to the caller.
    pub(crate) fn take_all(&mut self) -> VecDeque<QueuedOperation> {
        std::mem::take(&mut self.items)
    }

    pub(crate) fn pressure_multiplier(&self) -> f64 {
        pressure_multiplier(self.items.len(), self.capacity)
    }
}

/// Occupancy as a percentage of capacity.
pub(crate) fn occupancy_percentage(len: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        return 100.0;
    }
    (len as f64 / capacity as f64) * 100.0
}

/// Drain delay multiplier for the given queue occupancy.
///
/// `2.0` at or above 90% of capacity, `1.5` at or above 75%, else `1.0`.
pub fn pressure_multiplier(len: usize, capacity: usize) -> f64 {
    let percentage = occupancy_percentage(len, capacity);
    if percentage >= QUEUE_CRITICAL_PRESSURE_PERCENTAGE {
        CRITICAL_PRESSURE_MULTIPLIER
    } else if percentage >= QUEUE_HIGH_PRESSURE_PERCENTAGE {
        HIGH_PRESSURE_MULTIPLIER
    } else {
        1.0
    }
}

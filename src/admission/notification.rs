//! Queue pressure notifications and the observer registry.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;

use super::queue::occupancy_percentage;
use super::state::OperatingState;
use crate::config::{
    CRITICAL_MESSAGE, QUEUE_FULL_PERCENTAGE, QUEUE_WARNING_PERCENTAGE, WARNING_MESSAGE,
};

/// Severity of the pressure banner observers should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Normal,
    Warning,
    Critical,
}

/// Snapshot of queue pressure pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitNotification {
    pub level: NotificationLevel,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub queue_percentage: f64,
    pub state: OperatingState,
    /// Empty at `Normal` level
    pub message: String,
}

impl RateLimitNotification {
    /// Builds the snapshot for a queue holding `queue_size` of `queue_capacity`.
    pub fn from_queue(queue_size: usize, queue_capacity: usize, state: OperatingState) -> Self {
        let queue_percentage = occupancy_percentage(queue_size, queue_capacity);

        let (level, message) = if queue_percentage >= QUEUE_FULL_PERCENTAGE {
            (NotificationLevel::Critical, CRITICAL_MESSAGE)
        } else if queue_percentage >= QUEUE_WARNING_PERCENTAGE {
            (NotificationLevel::Warning, WARNING_MESSAGE)
        } else {
            (NotificationLevel::Normal, "")
        };

        RateLimitNotification {
            level,
            queue_size,
            queue_capacity,
            queue_percentage,
            state,
            message: message.to_string(),
        }
    }
}

/// Observer callback.
pub type NotificationCallback = Arc<dyn Fn(&RateLimitNotification) + Send + Sync>;

/// Who a posted notification is for.
enum Recipients {
    All,
    /// Initial snapshot for a new subscriber
    One(u64),
}

/// Notifications waiting to be delivered, oldest first.
#[derive(Default)]
struct Outbox {
    pending: VecDeque<(Recipients, RateLimitNotification)>,
    delivering: bool,
}

/// Registered observers, keyed by registration id.
///
/// Notifications are posted while the controller's state lock is held, so
/// the outbox order is the order of the state changes. [`Self::flush`]
/// delivers them in that order from one thread at a time: a flush that
/// finds another delivery in progress returns at once and leaves its
/// notifications to that thread.
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, NotificationCallback)>>,
    outbox: Mutex<Outbox>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        SubscriberRegistry {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
            outbox: Mutex::new(Outbox::default()),
        }
    }

    pub(crate) fn register(&self, callback: NotificationCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).push((id, callback));
        id
    }

    pub(crate) fn unregister(&self, id: u64) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Queues `notification` for every observer. Call [`Self::flush`] once
    /// the state lock is released.
    pub(crate) fn post(&self, notification: RateLimitNotification) {
        lock(&self.outbox)
            .pending
            .push_back((Recipients::All, notification));
    }

    /// Queues `notification` for observer `id` only.
    pub(crate) fn post_to(&self, id: u64, notification: RateLimitNotification) {
        lock(&self.outbox)
            .pending
            .push_back((Recipients::One(id), notification));
    }

    /// Delivers pending notifications in posting order.
    ///
    /// Callbacks run without any registry lock held, so they may call back
    /// into the controller or unsubscribe; anything they post is delivered
    /// after the notification that triggered them.
    pub(crate) fn flush(&self) {
        {
            let mut outbox = lock(&self.outbox);
            if outbox.delivering {
                return;
            }
            outbox.delivering = true;
        }

        loop {
            let (recipients, notification) = {
                let mut outbox = lock(&self.outbox);
                match outbox.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        outbox.delivering = false;
                        return;
                    }
                }
            };

            let targets: Vec<(u64, NotificationCallback)> = {
                let subscribers = lock(&self.subscribers);
                match recipients {
                    Recipients::All => subscribers.clone(),
                    Recipients::One(id) => subscribers
                        .iter()
                        .filter(|(sub_id, _)| *sub_id == id)
                        .cloned()
                        .collect(),
                }
            };
            for (id, callback) in targets {
                deliver_one(id, &callback, &notification);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Invokes one observer, containing any panic it raises.
fn deliver_one(
    id: u64,
    callback: &NotificationCallback,
    notification: &RateLimitNotification,
) {
    if catch_unwind(AssertUnwindSafe(|| callback(notification))).is_err() {
        log::warn!(
            "Rate limit notification subscriber {} panicked; continuing with remaining subscribers",
            id
        );
    }
}

/// Handle returned by [`crate::AdmissionController::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: u64, registry: &Arc<SubscriberRegistry>) -> Self {
        Subscription {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the observer. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.unregister(self.id),
            None => false,
        }
    }
}

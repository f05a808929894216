//! Admission controller implementation.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::notification::{
    NotificationCallback, RateLimitNotification, SubscriberRegistry, Subscription,
};
use super::queue::{QueuedOperation, RequestQueue};
use super::state::{OperatingState, RateLimitInfo, RecoveryProgress, ThrottleState, Transition};
use crate::config::AdmissionConfig;
use crate::error_handling::{
    AdmissionError, AdmissionEvent, AdmissionStats, ConfigError, QueueFullError,
};

/// Adaptive client-side admission controller.
///
/// Reacts to server-reported rate limits (429 responses):
/// - `Normal`: every operation runs immediately, with no admission limit
/// - `Throttled`: operations wait in a bounded FIFO queue that a single drain
///   loop works through, pausing `throttled interval x pressure multiplier`
///   between items
/// - `Recovering`: after enough successes the recommended polling interval is
///   relaxed stage by stage until the controller returns to `Normal`
///
/// The controller is a cheap handle: clones share the same state, so the HTTP
/// layer, pollers and UI observers can each hold one.
///
/// # Example
///
/// ```no_run
/// use fleet_admission::{AdmissionController, RateLimitInfo};
///
/// # async fn example() -> anyhow::Result<()> {
/// let controller = AdmissionController::default();
/// controller.notify_429(RateLimitInfo::new(20, 60.0, 60.0));
///
/// let devices = controller
///     .enqueue_request(|| async { Ok::<_, anyhow::Error>(vec!["device-1"]) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

struct Inner {
    config: AdmissionConfig,
    core: Mutex<Core>,
    subscribers: Arc<SubscriberRegistry>,
    stats: AdmissionStats,
}

/// Everything mutated together; never held across an `.await`.
struct Core {
    throttle: ThrottleState,
    queue: RequestQueue,
    processing: bool,
    drain_token: Option<CancellationToken>,
}

/// Read-only snapshot of the controller for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub state: OperatingState,
    pub queue_length: usize,
    pub current_interval_ms: f64,
    pub throttled_interval_ms: Option<f64>,
    pub success_count: u32,
    pub recovery_stage: usize,
    pub rate_limit_info: Option<RateLimitInfo>,
    pub last_429: Option<DateTime<Utc>>,
    pub processing: bool,
    pub subscribers: usize,
    pub stats: BTreeMap<&'static str, usize>,
}

enum Admission<F, T> {
    Immediate(F),
    Rejected(QueueFullError),
    Queued {
        outcome: oneshot::Receiver<anyhow::Result<T>>,
        queue_len: usize,
        drain: Option<CancellationToken>,
    },
}

enum DrainStep {
    Run(QueuedOperation),
    Exhausted,
}

impl AdmissionController {
    /// Creates a controller with the given policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the policy fails validation.
    pub fn new(config: AdmissionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: AdmissionConfig) -> Self {
        let core = Core {
            throttle: ThrottleState::new(config.baseline_interval_ms()),
            queue: RequestQueue::new(config.max_queue_size),
            processing: false,
            drain_token: None,
        };
        AdmissionController {
            inner: Arc::new(Inner {
                config,
                core: Mutex::new(core),
                subscribers: Arc::new(SubscriberRegistry::new()),
                stats: AdmissionStats::new(),
            }),
        }
    }

    /// Records a 429 and enters `Throttled`, superseding any earlier throttle
    /// or recovery progress.
    pub fn notify_429(&self, info: RateLimitInfo) {
        let interval_ms = {
            let mut core = self.lock();
            let interval_ms = core.throttle.apply_429(info, &self.inner.config);
            self.publish(&core);
            interval_ms
        };
        self.inner.stats.increment(AdmissionEvent::RateLimited);

        log::warn!(
            "Rate limit exceeded ({} requests per {}s, retry after {}s). Throttling requests.",
            info.requests_allowed,
            info.window_seconds,
            info.retry_after_seconds
        );
        log::info!("Throttled interval set to {:.0}ms", interval_ms);

        self.inner.subscribers.flush();
    }

    /// Records a successful response; drives recovery while not `Normal`.
    pub fn notify_success(&self) {
        self.inner.stats.increment(AdmissionEvent::Succeeded);

        let transition = {
            let mut core = self.lock();
            if !core.throttle.is_throttled() {
                return;
            }
            let transition = core.throttle.record_success(&self.inner.config);
            if transition != Transition::None {
                self.publish(&core);
            }
            transition
        };

        match transition {
            Transition::None => return,
            Transition::EnteredRecovery => log::info!("Entering recovery state"),
            Transition::AdvancedStage { stage, interval_ms } => log::info!(
                "Recovery stage {}: interval reduced to {:.0}ms",
                stage,
                interval_ms
            ),
            Transition::RecoveredToNormal => log::info!("Returned to normal state"),
        }

        self.inner.subscribers.flush();
    }

    /// `true` unless the controller is `Normal`.
    pub fn is_throttled(&self) -> bool {
        self.lock().throttle.is_throttled()
    }

    pub fn state(&self) -> OperatingState {
        self.lock().throttle.state()
    }

    /// Polling interval pollers should use right now, in milliseconds.
    pub fn recommended_interval_ms(&self) -> f64 {
        self.lock().throttle.current_interval_ms()
    }

    /// Polling interval pollers should use right now.
    pub fn recommended_interval(&self) -> Duration {
        millis_to_duration(self.recommended_interval_ms())
    }

    pub fn recovery_progress(&self) -> RecoveryProgress {
        self.lock().throttle.progress()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &AdmissionStats {
        &self.inner.stats
    }

    /// Current pressure snapshot, as observers would receive it.
    pub fn notification(&self) -> RateLimitNotification {
        snapshot_of(&self.lock())
    }

    /// Runs `run` now if healthy, otherwise queues it behind earlier work.
    ///
    /// While `Normal` the operation's outcome is returned untouched. While
    /// throttled the call resolves only once the drain loop has executed the
    /// operation; its result (success or error) is passed through as-is.
    ///
    /// # Errors
    ///
    /// - [`QueueFullError`] if the queue is at capacity; `run` is never called
    /// - [`AdmissionError::Discarded`] if `reset()` drops the queued operation
    /// - whatever error `run` itself produces
    pub async fn enqueue_request<F, Fut, T>(&self, run: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let rx = match self.admit(run) {
            Admission::Immediate(run) => {
                self.inner.stats.increment(AdmissionEvent::Immediate);
                return run().await;
            }
            Admission::Rejected(err) => {
                self.inner.stats.increment(AdmissionEvent::Rejected);
                log::warn!("Rejecting request: {}", err);
                return Err(err.into());
            }
            Admission::Queued {
                outcome,
                queue_len,
                drain,
            } => {
                self.inner.stats.increment(AdmissionEvent::Queued);
                log::debug!(
                    "Request queued ({} of {} slots used)",
                    queue_len,
                    self.inner.config.max_queue_size
                );
                self.inner.subscribers.flush();
                if let Some(token) = drain {
                    self.spawn_drain(token);
                }
                outcome
            }
        };

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AdmissionError::Discarded.into()),
        }
    }

    /// Decides under the lock whether `run` executes now, queues, or is refused.
    fn admit<F, Fut, T>(&self, run: F) -> Admission<F, T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut core = self.lock();
        if !core.throttle.is_throttled() {
            return Admission::Immediate(run);
        }

        let (tx, rx) = oneshot::channel();
        if let Err(err) = core.queue.push(QueuedOperation::new(run, tx)) {
            return Admission::Rejected(err);
        }

        let drain = if core.processing {
            None
        } else {
            let token = CancellationToken::new();
            core.processing = true;
            core.drain_token = Some(token.clone());
            Some(token)
        };
        self.publish(&core);

        Admission::Queued {
            outcome: rx,
            queue_len: core.queue.len(),
            drain,
        }
    }

    fn spawn_drain(&self, token: CancellationToken) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.drain_queue(token).await;
        });
    }

    /// Single consumer of the queue; exits once the queue is empty.
    ///
    /// `reset()` cancels `token` to cut a pacing sleep short. The loop stays
    /// the consumer across a reset (`processing` is only cleared here), so an
    /// operation still in flight is never overlapped by a second loop.
    async fn drain_queue(&self, mut token: CancellationToken) {
        loop {
            let step = {
                let mut core = self.lock();
                if token.is_cancelled() {
                    log::debug!("Drain loop resuming after reset");
                    token = CancellationToken::new();
                    core.drain_token = Some(token.clone());
                }
                let step = match core.queue.pop_front() {
                    Some(operation) => DrainStep::Run(operation),
                    None => {
                        core.processing = false;
                        core.drain_token = None;
                        DrainStep::Exhausted
                    }
                };
                self.publish(&core);
                step
            };
            self.inner.subscribers.flush();

            let operation = match step {
                DrainStep::Run(operation) => operation,
                DrainStep::Exhausted => {
                    log::debug!("Rate limit queue drained");
                    return;
                }
            };

            log::debug!(
                "Running queued request after {}ms in queue",
                operation.waited().as_millis()
            );
            if std::panic::AssertUnwindSafe(operation.execute())
                .catch_unwind()
                .await
                .is_err()
            {
                log::error!("Queued request panicked; its caller receives a discarded error");
                self.inner.stats.increment(AdmissionEvent::Discarded);
            } else {
                self.inner.stats.increment(AdmissionEvent::Drained);
            }

            let delay = {
                let core = self.lock();
                if core.queue.is_empty() {
                    None
                } else {
                    core.throttle
                        .throttled_interval_ms()
                        .map(|interval| interval * core.queue.pressure_multiplier())
                }
            };

            if let Some(delay_ms) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(millis_to_duration(delay_ms)) => {}
                    _ = token.cancelled() => {
                        log::debug!("Drain pause cut short by reset");
                    }
                }
            }
        }
    }

    /// Registers an observer and immediately sends it the current snapshot.
    ///
    /// Observer panics are caught and logged; they never reach other
    /// observers or the drain loop. Notifications reach each observer in the
    /// order the controller's state changed, whichever thread caused them.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RateLimitNotification) + Send + Sync + 'static,
    {
        let callback: NotificationCallback = Arc::new(callback);
        let id = {
            let core = self.lock();
            let id = self.inner.subscribers.register(callback);
            self.inner.subscribers.post_to(id, snapshot_of(&core));
            id
        };
        self.inner.subscribers.flush();
        Subscription::new(id, &self.inner.subscribers)
    }

    /// Read-only diagnostics snapshot.
    pub fn debug_info(&self) -> DebugInfo {
        let core = self.lock();
        let progress = core.throttle.progress();
        DebugInfo {
            state: core.throttle.state(),
            queue_length: core.queue.len(),
            current_interval_ms: core.throttle.current_interval_ms(),
            throttled_interval_ms: core.throttle.throttled_interval_ms(),
            success_count: progress.success_count,
            recovery_stage: progress.recovery_stage,
            rate_limit_info: core.throttle.rate_limit_info(),
            last_429: core.throttle.last_429(),
            processing: core.processing,
            subscribers: self.inner.subscribers.len(),
            stats: self.inner.stats.snapshot(),
        }
    }

    /// Returns the controller to its initial state.
    ///
    /// Queued operations are dropped without running (their callers receive
    /// [`AdmissionError::Discarded`]) and a pacing drain loop is woken so it
    /// can exit. An operation already running is left to finish; until it
    /// does, `DebugInfo::processing` stays `true` and later queued work waits
    /// behind it. Observers stay registered.
    pub fn reset(&self) {
        let discarded = {
            let mut core = self.lock();
            let discarded = core.queue.take_all();
            if let Some(token) = core.drain_token.take() {
                token.cancel();
            }
            core.throttle.reset(self.inner.config.baseline_interval_ms());
            self.publish(&core);
            discarded
        };

        self.inner.stats.clear();
        self.inner
            .stats
            .add(AdmissionEvent::Discarded, discarded.len());
        log::info!(
            "Admission controller reset ({} queued requests discarded)",
            discarded.len()
        );
        // Dropping the operations closes their completion channels
        drop(discarded);

        self.inner.subscribers.flush();
    }

    /// Posts the current snapshot for every observer; requires the state lock.
    fn publish(&self, core: &Core) {
        self.inner.subscribers.post(snapshot_of(core));
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.inner
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::with_valid_config(AdmissionConfig::default())
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.lock();
        f.debug_struct("AdmissionController")
            .field("state", &core.throttle.state())
            .field("queue_length", &core.queue.len())
            .field("current_interval_ms", &core.throttle.current_interval_ms())
            .finish()
    }
}

fn snapshot_of(core: &Core) -> RateLimitNotification {
    RateLimitNotification::from_queue(
        core.queue.len(),
        core.queue.capacity(),
        core.throttle.state(),
    )
}

/// Converts fractional milliseconds to a `Duration`, clamping nonsense values.
fn millis_to_duration(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}

//! Operating state and staged recovery bookkeeping.
//!
//! [`ThrottleState`] is the pure state machine behind the controller: it knows
//! nothing about queues, tasks or observers, only how 429s and successes move
//! the client between `Normal`, `Throttled` and `Recovering`, and what polling
//! interval each step recommends.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{
    AdmissionConfig, DEFAULT_RATE_LIMIT_REQUESTS, DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS,
    DEFAULT_RATE_LIMIT_WINDOW_SECS,
};

/// Current operating state of the admission controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingState {
    /// Healthy: every call runs immediately.
    #[default]
    Normal,
    /// A 429 was seen; calls are queued and paced.
    Throttled,
    /// Enough successes seen since the last 429; pacing is being relaxed.
    Recovering,
}

impl OperatingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingState::Normal => "normal",
            OperatingState::Throttled => "throttled",
            OperatingState::Recovering => "recovering",
        }
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate limit disclosure carried by a 429 response.
///
/// Serialized with the API's field names (`requests`, `window`, `retryAfter`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests allowed per window
    #[serde(rename = "requests")]
    pub requests_allowed: u32,
    /// Window length in seconds
    #[serde(rename = "window")]
    pub window_seconds: f64,
    /// Seconds until the server's limit resets
    #[serde(rename = "retryAfter", default)]
    pub retry_after_seconds: f64,
}

impl RateLimitInfo {
    pub fn new(requests_allowed: u32, window_seconds: f64, retry_after_seconds: f64) -> Self {
        RateLimitInfo {
            requests_allowed,
            window_seconds,
            retry_after_seconds,
        }
    }

    /// Milliseconds between requests that exactly meets the server budget.
    ///
    /// A zero request count is treated as one request per window.
    pub fn base_interval_ms(&self) -> f64 {
        (self.window_seconds / f64::from(self.requests_allowed.max(1))) * 1000.0
    }
}

/// The budget assumed when a 429 carries no disclosure: 20 requests per minute.
impl Default for RateLimitInfo {
    fn default() -> Self {
        RateLimitInfo {
            requests_allowed: DEFAULT_RATE_LIMIT_REQUESTS,
            window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            retry_after_seconds: DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS,
        }
    }
}

/// Successes counted since the last 429 and the recovery stage reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryProgress {
    pub success_count: u32,
    pub recovery_stage: usize,
}

/// State change caused by a reported success.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Transition {
    /// Nothing observable changed
    None,
    /// Throttled -> Recovering (stage 0)
    EnteredRecovery,
    /// Recovering stage advanced; carries the new stage and interval
    AdvancedStage { stage: usize, interval_ms: f64 },
    /// Final stage crossed; back to Normal
    RecoveredToNormal,
}

/// Throttling state machine.
#[derive(Debug, Clone)]
pub(crate) struct ThrottleState {
    state: OperatingState,
    rate_limit_info: Option<RateLimitInfo>,
    throttled_interval_ms: Option<f64>,
    current_interval_ms: f64,
    progress: RecoveryProgress,
    last_429: Option<DateTime<Utc>>,
}

impl ThrottleState {
    pub(crate) fn new(baseline_interval_ms: f64) -> Self {
        ThrottleState {
            state: OperatingState::Normal,
            rate_limit_info: None,
            throttled_interval_ms: None,
            current_interval_ms: baseline_interval_ms,
            progress: RecoveryProgress::default(),
            last_429: None,
        }
    }

    pub(crate) fn state(&self) -> OperatingState {
        self.state
    }

    pub(crate) fn is_throttled(&self) -> bool {
        self.state != OperatingState::Normal
    }

    pub(crate) fn rate_limit_info(&self) -> Option<RateLimitInfo> {
        self.rate_limit_info
    }

    pub(crate) fn throttled_interval_ms(&self) -> Option<f64> {
        self.throttled_interval_ms
    }

    pub(crate) fn current_interval_ms(&self) -> f64 {
        self.current_interval_ms
    }

    pub(crate) fn progress(&self) -> RecoveryProgress {
        self.progress
    }

    pub(crate) fn last_429(&self) -> Option<DateTime<Utc>> {
        self.last_429
    }

    /// Enters `Throttled` from any state and recomputes pacing from `info`.
    ///
    /// Returns the new throttled interval in milliseconds.
    pub(crate) fn apply_429(&mut self, info: RateLimitInfo, config: &AdmissionConfig) -> f64 {
        let throttled = info.base_interval_ms() * config.safety_margin;

        self.state = OperatingState::Throttled;
        self.rate_limit_info = Some(info);
        self.throttled_interval_ms = Some(throttled);
        self.current_interval_ms = throttled;
        self.progress = RecoveryProgress::default();
        self.last_429 = Some(Utc::now());

        throttled
    }

    /// Counts one success and applies at most one state transition.
    pub(crate) fn record_success(&mut self, config: &AdmissionConfig) -> Transition {
        if self.state == OperatingState::Normal {
            return Transition::None;
        }

        self.progress.success_count = self.progress.success_count.saturating_add(1);

        if self.state == OperatingState::Throttled
            && self.progress.success_count >= config.recovery_thresholds[0]
        {
            self.state = OperatingState::Recovering;
            self.progress.recovery_stage = 0;
            return Transition::EnteredRecovery;
        }

        if self.state == OperatingState::Recovering {
            return self.advance_recovery(config);
        }

        Transition::None
    }

    fn advance_recovery(&mut self, config: &AdmissionConfig) -> Transition {
        if self.throttled_interval_ms.is_none() {
            return Transition::None;
        }

        let stage = self.progress.recovery_stage;
        if self.progress.success_count < next_stage_threshold(config, stage) {
            return Transition::None;
        }

        let increment = config.recovery_increments.get(stage).copied().unwrap_or(0.0);
        let baseline = config.baseline_interval_ms();
        let mut relaxed = self.current_interval_ms * (1.0 - increment);
        // Recovery may relax toward the baseline but never past it
        if self.current_interval_ms >= baseline {
            relaxed = relaxed.max(baseline);
        }
        self.current_interval_ms = relaxed;
        self.progress.recovery_stage = stage + 1;

        if self.progress.recovery_stage >= config.recovery_thresholds.len() {
            self.reset(baseline);
            return Transition::RecoveredToNormal;
        }

        Transition::AdvancedStage {
            stage: self.progress.recovery_stage,
            interval_ms: relaxed,
        }
    }

    /// Returns to the initial `Normal` state.
    pub(crate) fn reset(&mut self, baseline_interval_ms: f64) {
        *self = ThrottleState::new(baseline_interval_ms);
    }
}

/// Success count that moves recovery from `stage` to `stage + 1`.
///
/// The last stage has no configured threshold of its own; it repeats the
/// spacing between the final two thresholds (or the single threshold itself).
pub(crate) fn next_stage_threshold(config: &AdmissionConfig, stage: usize) -> u32 {
    let thresholds = &config.recovery_thresholds;
    if let Some(threshold) = thresholds.get(stage + 1) {
        return *threshold;
    }
    let last = thresholds[thresholds.len() - 1];
    let stride = if thresholds.len() >= 2 {
        last - thresholds[thresholds.len() - 2]
    } else {
        last
    };
    last.saturating_add(stride)
}

//! Configuration types.
//!
//! This module defines the structs used to configure the admission controller
//! and the throttled HTTP client, plus the logging option enums.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::config::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_POLLING_INTERVAL,
    DEFAULT_RECOVERY_INCREMENTS, DEFAULT_RECOVERY_THRESHOLDS, DEFAULT_SAFETY_MARGIN,
    DEFAULT_USER_AGENT,
};
use crate::error_handling::ConfigError;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: One JSON object per line for log shippers
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    #[default]
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Admission controller configuration.
///
/// Every field is optional when deserializing; missing fields take the
/// defaults from [`crate::config`]. Call [`AdmissionConfig::validate`] (or
/// construct the controller, which validates) before use.
///
/// # Examples
///
/// ```
/// use fleet_admission::AdmissionConfig;
///
/// let config = AdmissionConfig {
///     max_queue_size: 50,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdmissionConfig {
    /// Maximum number of operations waiting in the queue
    pub max_queue_size: usize,

    /// Success counts for recovery stages (ascending)
    pub recovery_thresholds: Vec<u32>,

    /// Interval reduction per stage (same length as `recovery_thresholds`)
    pub recovery_increments: Vec<f64>,

    /// Multiplier applied to the server-reported interval
    pub safety_margin: f64,

    /// Polling interval recommended while healthy; also the recovery floor
    #[serde(
        rename = "baselineIntervalMs",
        deserialize_with = "deserialize_millis"
    )]
    pub baseline_interval: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        AdmissionConfig {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            recovery_thresholds: DEFAULT_RECOVERY_THRESHOLDS.to_vec(),
            recovery_increments: DEFAULT_RECOVERY_INCREMENTS.to_vec(),
            safety_margin: DEFAULT_SAFETY_MARGIN,
            baseline_interval: DEFAULT_POLLING_INTERVAL,
        }
    }
}

impl AdmissionConfig {
    /// Checks the recovery policy for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        if self.recovery_thresholds.is_empty() {
            return Err(ConfigError::EmptyThresholds);
        }
        if self.recovery_thresholds.len() != self.recovery_increments.len() {
            return Err(ConfigError::MismatchedRecoveryStages {
                thresholds: self.recovery_thresholds.len(),
                increments: self.recovery_increments.len(),
            });
        }
        if self.recovery_thresholds[0] == 0
            || self.recovery_thresholds.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(ConfigError::UnorderedThresholds(
                self.recovery_thresholds.clone(),
            ));
        }
        if let Some(bad) = self
            .recovery_increments
            .iter()
            .find(|inc| !inc.is_finite() || **inc < 0.0 || **inc >= 1.0)
        {
            return Err(ConfigError::InvalidIncrement(*bad));
        }
        if !self.safety_margin.is_finite() || self.safety_margin < 1.0 {
            return Err(ConfigError::InvalidSafetyMargin(self.safety_margin));
        }
        Ok(())
    }

    /// Baseline polling interval in milliseconds.
    pub fn baseline_interval_ms(&self) -> f64 {
        self.baseline_interval.as_secs_f64() * 1000.0
    }
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Configuration for the throttled API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the management API (e.g. `https://api.example.com/api/v1/`)
    pub base_url: String,

    /// HTTP client timeout in seconds
    pub timeout_seconds: u64,

    /// HTTP User-Agent header value
    pub user_agent: String,

    /// Admission policy for the client's controller
    pub admission: AdmissionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: "http://localhost:3443/api/v1/".to_string(),
            timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            admission: AdmissionConfig::default(),
        }
    }
}

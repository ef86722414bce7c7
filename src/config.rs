use crate::error::{ThrottlerError, ThrottlerResult};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest accepted slot count
pub const MAX_SLOT_COUNT: usize = u32::MAX as usize;

/// Longest accepted slot cooldown, 8.64e15ms (about 273,790 years)
pub const MAX_SLOT_COOLDOWN: Duration = Duration::from_millis(8_640_000_000_000_000);

/// Fixed configuration of a [`crate::Throttler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlerConfig {
    /// Number of slots, always at least 1
    pub slot_count: usize,
    /// Minimum time a slot rests after release before it can be granted again
    #[serde(with = "humantime_serde")]
    pub slot_cooldown: Duration,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            slot_count: 1,
            slot_cooldown: Duration::from_secs(1),
        }
    }
}

impl ThrottlerConfig {
    /// Create a configuration, clamping `slot_count` into `1..=MAX_SLOT_COUNT` and
    /// `slot_cooldown` to at most [`MAX_SLOT_COOLDOWN`]
    pub fn new(slot_count: usize, slot_cooldown: Duration) -> Self {
        Self {
            slot_count: slot_count.clamp(1, MAX_SLOT_COUNT),
            slot_cooldown: slot_cooldown.min(MAX_SLOT_COOLDOWN),
        }
    }

    /// Build a configuration from plain numbers, with the cooldown in milliseconds.
    ///
    /// Non-finite input is rejected, as is a slot count above [`MAX_SLOT_COUNT`] or a
    /// cooldown above [`MAX_SLOT_COOLDOWN`]. Input below the valid domain is clamped:
    /// the slot count to at least 1 (fractions are truncated) and the cooldown to at
    /// least 0.
    pub fn from_raw(slot_count: f64, slot_cooldown_ms: f64) -> ThrottlerResult<Self> {
        if !slot_count.is_finite() {
            return Err(ThrottlerError::InvalidConfiguration(format!(
                "No or invalid slot count given: {}",
                slot_count
            )));
        }
        if !slot_cooldown_ms.is_finite() {
            return Err(ThrottlerError::InvalidConfiguration(format!(
                "No or invalid slot cooldown given: {}",
                slot_cooldown_ms
            )));
        }

        if slot_count > MAX_SLOT_COUNT as f64 {
            return Err(ThrottlerError::InvalidConfiguration(format!(
                "Slot count {} exceeds the maximum of {}",
                slot_count, MAX_SLOT_COUNT
            )));
        }
        if slot_cooldown_ms > MAX_SLOT_COOLDOWN.as_millis() as f64 {
            return Err(ThrottlerError::InvalidConfiguration(format!(
                "Slot cooldown of {}ms exceeds the maximum of {:?}",
                slot_cooldown_ms, MAX_SLOT_COOLDOWN
            )));
        }

        let slot_cooldown = Duration::try_from_secs_f64(slot_cooldown_ms.max(0.0) / 1000.0)
            .map_err(|e| {
                ThrottlerError::InvalidConfiguration(format!(
                    "Slot cooldown of {}ms is out of range: {}",
                    slot_cooldown_ms, e
                ))
            })?;

        // Bounded above, so the truncating cast cannot saturate
        Ok(Self::new(slot_count.max(1.0) as usize, slot_cooldown))
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

/// Command line and environment configuration for the runner binary
#[derive(Debug, Clone, Parser)]
#[command(name = "slot-throttler", version, about)]
pub struct Config {
    /// Number of concurrent slots
    #[arg(long, env = "THROTTLER_SLOTS", default_value_t = 1.0, allow_negative_numbers = true)]
    pub slots: f64,

    /// Cooldown applied to a slot after each release, in milliseconds
    #[arg(long, env = "THROTTLER_COOLDOWN_MS", default_value_t = 1000.0, allow_negative_numbers = true)]
    pub cooldown_ms: f64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "THROTTLER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// JSON file describing the jobs to run
    #[arg(long, env = "THROTTLER_JOBS")]
    pub jobs: Option<PathBuf>,

    /// Number of jobs to generate when no job file is given
    #[arg(long, default_value_t = 5)]
    pub count: usize,

    /// Simulated work per generated job, e.g. "50ms"
    #[arg(long, default_value = "0s", value_parser = parse_duration)]
    pub work: Duration,

    /// Make every n-th generated job fail (0 disables failures)
    #[arg(long, default_value_t = 0)]
    pub fail_every: usize,
}

impl Config {
    /// Parse configuration from the process arguments and environment
    pub fn from_env() -> Self {
        Config::parse()
    }

    /// Throttler configuration derived from the numeric flags
    pub fn throttler_config(&self) -> ThrottlerResult<ThrottlerConfig> {
        ThrottlerConfig::from_raw(self.slots, self.cooldown_ms)
    }
}

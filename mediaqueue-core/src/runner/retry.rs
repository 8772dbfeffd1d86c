use std::time::Duration;

use crate::config::RetrySection;
use crate::error::ConfigError;

use super::QueueError;

/// How often and how patiently an entry is retried.
///
/// The delay ramps linearly from the first to the second bound over
/// `ramp_attempts` retries and stays at the upper bound afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until the entry succeeds.
    pub attempts: Option<u32>,
    pub delay_range: [u64; 2],
    pub ramp_attempts: u32,
    /// Pause before re-running an entry whose download worked but whose
    /// planning or mux did not.
    pub rerun_delay: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: None,
            delay_range: [30, 30],
            ramp_attempts: 1,
            rerun_delay: 0,
        }
    }
}

impl RetryPolicy {
    pub fn capped(attempts: u32, delay_seconds: u64) -> Self {
        Self {
            attempts: Some(attempts.max(1)),
            delay_range: [delay_seconds, delay_seconds],
            ramp_attempts: 1,
            rerun_delay: 0,
        }
    }

    pub fn with_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.attempts = attempts.filter(|attempts| *attempts > 0);
        self
    }

    /// Delay after the failed attempt numbered `attempt` (0-based).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let [min, max] = self.delay_range;
        if self.ramp_attempts <= 1 || min == max {
            return Duration::from_secs(min);
        }
        let steps = (self.ramp_attempts - 1) as f64;
        let ratio = (attempt as f64 / steps).min(1.0);
        let seconds = min as f64 + (max as f64 - min as f64) * ratio;
        Duration::from_secs(seconds.round() as u64)
    }

    /// Delay after `err` ended the failed attempt numbered `attempt`. Only a
    /// failed download waits out the ramp.
    pub fn delay_for(&self, err: &QueueError, attempt: u32) -> Duration {
        match err {
            QueueError::DownloadFailed { .. } => self.compute_delay(attempt),
            _ => Duration::from_secs(self.rerun_delay),
        }
    }

    /// Whether another attempt may follow `completed` failed attempts.
    pub fn allows_another(&self, completed: u32) -> bool {
        self.attempts.map_or(true, |attempts| completed < attempts)
    }
}

impl TryFrom<&RetrySection> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(section: &RetrySection) -> Result<Self, Self::Error> {
        let [min, max] = section.delay_seconds;
        if min > max {
            return Err(ConfigError::Invalid(format!(
                "retry.delay_seconds must be ascending, got [{min}, {max}]"
            )));
        }
        Ok(Self {
            attempts: (section.max_attempts > 0).then_some(section.max_attempts),
            delay_range: section.delay_seconds,
            ramp_attempts: section.ramp_attempts.max(1),
            rerun_delay: section.rerun_delay_seconds,
        })
    }
}

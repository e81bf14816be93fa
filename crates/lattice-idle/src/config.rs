//! Scheduler configuration

use crate::error::{IdleError, IdleResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay after `start()` before the first pass
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(60);

/// Time between passes
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Records read from the end of the log for an eligibility check
pub const DEFAULT_TAIL_WINDOW: usize = 50;

/// Idle compaction scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    #[serde(with = "humantime_serde")]
    pub startup_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    pub tail_window: usize,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            startup_delay: DEFAULT_STARTUP_DELAY,
            check_interval: DEFAULT_CHECK_INTERVAL,
            tail_window: DEFAULT_TAIL_WINDOW,
        }
    }
}

impl IdleConfig {
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_tail_window(mut self, records: usize) -> Self {
        self.tail_window = records;
        self
    }

    pub fn validate(&self) -> IdleResult<()> {
        if self.check_interval.is_zero() {
            return Err(IdleError::config("check_interval must be greater than zero"));
        }
        if self.tail_window == 0 {
            return Err(IdleError::config("tail_window must be at least 1"));
        }
        Ok(())
    }
}

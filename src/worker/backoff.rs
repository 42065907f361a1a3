//! Adaptive delay between poll cycles

use crate::worker::WorkerConfig;
use std::time::Duration;

/// Delay before the next poll: resets after a productive cycle, grows otherwise
#[derive(Debug, Clone, PartialEq)]
pub struct PollBackoff {
    current: Duration,
    base: Duration,
    max: Duration,
    multiplier: f64,
}

impl PollBackoff {
    pub fn new(base: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            current: base,
            base,
            max: max.max(base),
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            config.poll_base_delay,
            config.poll_max_delay,
            config.poll_multiplier,
        )
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Fold one cycle's join count into the delay and return the new delay
    pub fn advance(&mut self, joined: usize) -> Duration {
        self.current = if joined > 0 {
            self.base
        } else {
            Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
                .unwrap_or(self.max)
                .min(self.max)
        };
        self.current
    }
}

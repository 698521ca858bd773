use std::time::Duration;

use rand::Rng;

use crate::config::ScanConfig;

/// Retry budget for a single page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Fail on the first error.
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay_ms: 0,
        max_delay_ms: 0,
    };

    /// Delay before retry number `attempt` (1-based): the nominal delay plus
    /// up to 25% jitter, never above `max_delay_ms`.
    pub fn delay(&self, attempt: u8) -> Duration {
        let nominal = self.nominal_delay_ms(attempt);
        let jitter = if nominal > 0 {
            rand::rng().random_range(0..=nominal / 4)
        } else {
            0
        };
        Duration::from_millis(nominal.saturating_add(jitter).min(self.max_delay_ms))
    }

    /// `base_delay_ms` doubled per earlier retry, capped.
    fn nominal_delay_ms(&self, attempt: u8) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let factor = 1u64
            .checked_shl(u32::from(attempt - 1))
            .unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

impl From<&ScanConfig> for RetryPolicy {
    fn from(config: &ScanConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

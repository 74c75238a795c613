//! Retry budgets and backoff schedules.
//!
//! The transport retries a single request with exponential backoff; the
//! fallback resolvers wrap whole lookups in a smaller, fixed-delay budget.

use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor ^ attempt`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Applies +/- 50% random jitter to the computed delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(500))
    }
}

impl Backoff {
    /// Doubling schedule without jitter.
    pub const fn exponential(base: Duration) -> Self {
        Self::Exponential {
            base,
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: false,
        }
    }

    /// Same schedule with jitter switched on or off.
    pub fn with_jitter(self, enabled: bool) -> Self {
        match self {
            Self::Exponential {
                base, factor, max, ..
            } => Self::Exponential {
                base,
                factor,
                max,
                jitter: enabled,
            },
            fixed => fixed,
        }
    }

    /// Delay to wait after the given 0-based attempt failed.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = seconds.min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(capped);

                if !jitter {
                    return delay;
                }

                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let spread = millis / 2;
                let offset = fastrand::u64(0..=spread.saturating_mul(2));
                Duration::from_millis(millis.saturating_sub(spread).saturating_add(offset))
            }
        }
    }
}

/// Retry budget: total attempts are `max_retries + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32, base: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::exponential(base),
        }
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.backoff = self.backoff.with_jitter(enabled);
        self
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

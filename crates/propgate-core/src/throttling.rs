use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outbound request budget shared by every transport attempt.
///
/// Throttling only delays requests; it never fails them.
#[derive(Clone)]
pub struct UpstreamThrottle {
    limiter: Option<Arc<DirectRateLimiter>>,
    clock: DefaultClock,
}

impl std::fmt::Debug for UpstreamThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamThrottle")
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}

impl UpstreamThrottle {
    /// A zero quota disables throttling.
    pub fn per_minute(quota: u32) -> Self {
        let limiter = NonZeroU32::new(quota)
            .map(|burst| Arc::new(RateLimiter::direct(Quota::per_minute(burst))));
        Self {
            limiter,
            clock: DefaultClock::default(),
        }
    }

    pub fn unlimited() -> Self {
        Self::per_minute(0)
    }

    /// Returns the wait until budget is available when the quota is exhausted.
    pub fn acquire(&self) -> Result<(), Duration> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Waits until the budget admits one more request.
    pub async fn until_ready(&self) {
        while let Err(delay) = self.acquire() {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "upstream quota exhausted; waiting");
            tokio::time::sleep(delay).await;
        }
    }
}

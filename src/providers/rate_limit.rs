// Token-bucket rate limiter (spec §4.9): `acquire()` suspends until a token
// is available. One limiter instance is shared by every pipeline task
// talking to the same provider.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use std::num::NonZeroU32;

pub struct RateLimiter {
    inner: GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute.max(1)).unwrap();
        Self {
            inner: GovernorLimiter::direct(Quota::per_minute(rpm)),
        }
    }

    /// Suspends until a token is available. A genuine suspension point
    /// (spec §5): other tasks run while this one waits.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_acquire_does_not_block() {
        let limiter = RateLimiter::new(60);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < std::time::Duration::from_millis(100));
    }
}

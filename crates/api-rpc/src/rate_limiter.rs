//! Push Rate Limiter (token bucket)
//!
//! Guards `queue.push.v1` against a runaway client flooding the queues.
//! State is one packed atomic word so concurrent RPC calls never block on
//! each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Default burst size for push calls
pub const DEFAULT_BURST: u32 = 200;
/// Default sustained push rate (calls per second)
pub const DEFAULT_RATE: u32 = 100;

/// Largest burst a bucket holds
pub const MAX_BURST: u32 = u16::MAX as u32;

const CLOCK_BITS: u32 = 48;
const CLOCK_MASK: u64 = (1 << CLOCK_BITS) - 1;

/// Token bucket with atomic compare-and-swap updates
pub struct RateLimiter {
    // Upper 16 bits: tokens, lower 48 bits: last refill (ms since `epoch`)
    packed: AtomicU64,
    epoch: Instant,
    burst: u32,
    rate: u32,
}

fn pack(tokens: u32, at_ms: u64) -> u64 {
    ((tokens as u64) << CLOCK_BITS) | (at_ms & CLOCK_MASK)
}

fn unpack(packed: u64) -> (u32, u64) {
    ((packed >> CLOCK_BITS) as u32, packed & CLOCK_MASK)
}

impl RateLimiter {
    /// Create a full bucket
    ///
    /// # Arguments
    /// * `burst` - Maximum tokens held at once, capped at [`MAX_BURST`]
    /// * `rate` - Tokens added per second
    pub fn new(burst: u32, rate: u32) -> Self {
        let burst = burst.min(MAX_BURST);
        Self {
            packed: AtomicU64::new(pack(burst, 0)),
            epoch: Instant::now(),
            burst,
            rate,
        }
    }

    /// Take one token; false when the bucket is empty
    pub fn try_acquire(&self) -> bool {
        let now_ms = self.epoch.elapsed().as_millis().min(CLOCK_MASK as u128) as u64;
        self.try_acquire_at(now_ms)
    }

    /// Take one token at `now_ms` milliseconds after the bucket was created
    fn try_acquire_at(&self, now_ms: u64) -> bool {
        loop {
            let current = self.packed.load(Ordering::Acquire);
            let (tokens, last_ms) = unpack(current);

            let refill = now_ms.saturating_sub(last_ms).saturating_mul(self.rate as u64) / 1000;
            let available = (tokens as u64).saturating_add(refill).min(self.burst as u64) as u32;

            // Only move the refill clock when tokens were actually added
            let stamp = if refill > 0 { now_ms } else { last_ms };

            if available == 0 {
                return false;
            }

            let next = pack(available - 1, stamp);
            if self
                .packed
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Tokens currently held (without refill)
    pub fn remaining(&self) -> u32 {
        unpack(self.packed.load(Ordering::Acquire)).0
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BURST, DEFAULT_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[test]
    fn test_allows_burst_then_denies() {
        let limiter = RateLimiter::new(10, 1);

        for _ in 0..10 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn test_refills_after_long_uptime() {
        let limiter = RateLimiter::new(2, 10);
        // Past 2^32 ms (about 50 days)
        let late = (u32::MAX as u64) + 60_000;

        assert!(limiter.try_acquire_at(late));
        assert!(limiter.try_acquire_at(late));
        assert!(!limiter.try_acquire_at(late));

        // 10 per second: one token back after 100ms
        assert!(limiter.try_acquire_at(late + 100));
        assert!(!limiter.try_acquire_at(late + 100));
        assert!(limiter.try_acquire_at(late + 5_000));
    }

    #[test]
    fn test_burst_capped() {
        let limiter = RateLimiter::new(u32::MAX, 1);
        assert_eq!(limiter.remaining(), MAX_BURST);
    }

    #[tokio::test]
    async fn test_refills_over_time() {
        let limiter = RateLimiter::new(5, 10);

        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        sleep(Duration::from_millis(300)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_bucket() {
        // Slow refill: the burst is the only budget during the test
        let limiter = Arc::new(RateLimiter::new(100, 1));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { (0..20).filter(|_| limiter.try_acquire()).count() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            allowed += handle.await.unwrap();
        }

        assert!(allowed >= 100 && allowed <= 101, "allowed {}", allowed);
    }
}

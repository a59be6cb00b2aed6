// Retry policy for items a handler hands back
use crate::domain::{Item, QueueConfig};
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue the item after the backoff delay (ms)
    Retry(u64),
    /// Do not retry, the item has failed permanently
    Failed,
}

/// Retry policy for handler-reported failures
///
/// Determines if an item should be requeued based on:
/// - Attempts already made
/// - The configured ceiling (`None` = unbounded)
/// - Base delay and backoff factor for exponential delay
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: Option<u32>,
    base_delay_ms: u64,
    backoff_factor: f64,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_retries` - Ceiling on retries per item (`None` retries forever)
    /// * `base_delay_ms` - Delay before the first retry
    /// * `backoff_factor` - Multiplier applied per further attempt
    pub fn new(max_retries: Option<u32>, base_delay_ms: u64, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            backoff_factor,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_delay_ms,
            config.backoff_factor,
        )
    }

    /// Determine if an item should be retried
    ///
    /// Backoff formula:
    /// delay = base_delay * (backoff_factor ^ attempts) * (1.0 ± 0.1)
    pub fn should_retry<T>(&self, queue: &str, item: &Item<T>) -> RetryDecision {
        if let Some(max) = self.max_retries {
            if item.attempts() >= max {
                warn!(
                    queue = %queue,
                    key = ?item.key(),
                    attempts = %item.attempts(),
                    max_retries = %max,
                    "Max retry attempts reached"
                );
                return RetryDecision::Failed;
            }
        }

        if self.base_delay_ms == 0 {
            return RetryDecision::Retry(0);
        }

        let base_delay_ms =
            self.base_delay_ms as f64 * self.backoff_factor.powi(item.attempts() as i32);

        // ±10% jitter, seeded by key and attempt (deterministic per item)
        let jitter_seed = item
            .key()
            .map(|k| k.chars().fold(0u32, |acc, c| acc.wrapping_add(c as u32)))
            .unwrap_or(0)
            .wrapping_add(item.attempts());
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = (base_delay_ms * jitter_factor) as u64;

        info!(
            queue = %queue,
            key = ?item.key(),
            attempt = %item.attempts(),
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }

    /// Count the attempt on an item about to be requeued
    pub fn prepare_for_retry<T>(&self, item: &mut Item<T>) {
        item.record_attempt();
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_until_ceiling() {
        let policy = RetryPolicy::new(Some(2), 0, 2.0);
        let mut item = Item::keyed("x", "k");

        assert_eq!(policy.should_retry("q", &item), RetryDecision::Retry(0));
        policy.prepare_for_retry(&mut item);
        assert_eq!(policy.should_retry("q", &item), RetryDecision::Retry(0));
        policy.prepare_for_retry(&mut item);
        assert_eq!(policy.should_retry("q", &item), RetryDecision::Failed);
    }

    #[test]
    fn test_zero_ceiling_never_retries() {
        let policy = RetryPolicy::new(Some(0), 100, 2.0);
        assert_eq!(policy.should_retry("q", &Item::new(1)), RetryDecision::Failed);
    }

    #[test]
    fn test_unbounded_policy_keeps_retrying() {
        let policy = RetryPolicy::new(None, 0, 2.0);
        let mut item = Item::new(1);
        for _ in 0..1000 {
            policy.prepare_for_retry(&mut item);
        }
        assert_eq!(policy.should_retry("q", &item), RetryDecision::Retry(0));
    }

    #[test]
    fn test_backoff_grows_within_jitter_bounds() {
        let policy = RetryPolicy::new(Some(10), 100, 2.0);
        let mut item = Item::keyed("x", "webhook:42");

        let RetryDecision::Retry(first) = policy.should_retry("q", &item) else {
            panic!("expected retry");
        };
        assert!((90..=110).contains(&first), "first delay {}", first);

        policy.prepare_for_retry(&mut item);
        policy.prepare_for_retry(&mut item);
        let RetryDecision::Retry(third) = policy.should_retry("q", &item) else {
            panic!("expected retry");
        };
        assert!((360..=440).contains(&third), "third delay {}", third);
    }

    #[test]
    fn test_long_key_jitter_does_not_overflow() {
        let policy = RetryPolicy::new(Some(10), 100, 2.0);
        let item = Item::keyed("x", "\u{10FFFF}".repeat(5000));

        let RetryDecision::Retry(delay) = policy.should_retry("q", &item) else {
            panic!("expected retry");
        };
        assert!((90..=110).contains(&delay), "delay {}", delay);
    }
}

// Boost Controller - timer-driven scaling state machine

use crate::domain::QueueConfig;

/// Scaling phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostState {
    /// Running with the base worker count
    Base,
    /// Backlog at or above the trigger since `since` (ms)
    Saturating { since: i64 },
    /// Extra workers allowed until `until` (ms)
    Boosted { until: i64 },
}

/// What the pool should do after an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostAction {
    None,
    /// Spawn up to `boost_workers` extra workers
    Boost,
    /// Boost window over; idle workers above base may retire
    Expire,
}

/// Decides when a pool boosts and when the boost ends.
///
/// Pure state machine fed with `(now_ms, pending)` samples so it can be
/// driven by a manual clock in tests.
///
/// ```text
///   Base --pending >= trigger--> Saturating --held for timeout--> Boosted
///    ^                              |                               |
///    +------pending < trigger-------+                               |
///    +-----------------------duration elapsed-----------------------+
/// ```
#[derive(Debug, Clone)]
pub struct BoostController {
    enabled: bool,
    trigger: usize,
    timeout_ms: i64,
    duration_ms: i64,
    state: BoostState,
}

impl BoostController {
    pub fn new(trigger: usize, timeout_ms: u64, duration_ms: u64, enabled: bool) -> Self {
        Self {
            enabled,
            trigger: trigger.max(1),
            timeout_ms: timeout_ms as i64,
            duration_ms: duration_ms as i64,
            state: BoostState::Base,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.effective_boost_trigger(),
            config.boost_timeout_ms,
            config.boost_duration_ms,
            config.boost_workers > 0,
        )
    }

    pub fn state(&self) -> BoostState {
        self.state
    }

    pub fn is_boosted(&self) -> bool {
        matches!(self.state, BoostState::Boosted { .. })
    }

    /// Feed one sample of the channel depth
    pub fn observe(&mut self, now_ms: i64, pending: usize) -> BoostAction {
        if !self.enabled {
            return BoostAction::None;
        }
        let saturated = pending >= self.trigger;

        match self.state {
            BoostState::Base => {
                if !saturated {
                    return BoostAction::None;
                }
                if self.timeout_ms <= 0 {
                    return self.boost(now_ms);
                }
                self.state = BoostState::Saturating { since: now_ms };
                BoostAction::None
            }
            BoostState::Saturating { since } => {
                if !saturated {
                    self.state = BoostState::Base;
                    BoostAction::None
                } else if now_ms - since >= self.timeout_ms {
                    self.boost(now_ms)
                } else {
                    BoostAction::None
                }
            }
            BoostState::Boosted { until } => {
                if now_ms < until {
                    return BoostAction::None;
                }
                // Still saturated: start timing a fresh boost
                self.state = if saturated {
                    BoostState::Saturating { since: now_ms }
                } else {
                    BoostState::Base
                };
                BoostAction::Expire
            }
        }
    }

    fn boost(&mut self, now_ms: i64) -> BoostAction {
        self.state = BoostState::Boosted {
            until: now_ms + self.duration_ms,
        };
        BoostAction::Boost
    }
}

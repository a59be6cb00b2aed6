// Worker pool constants (no magic values)
use std::time::Duration;

/// How long an idle worker waits for an item before re-checking
/// whether it should retire (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Scaling task tick when no push wakes it (50ms)
pub const SCALE_TICK_DURATION: Duration = Duration::from_millis(50);

/// Poll interval while waiting for a flush to complete (10ms)
pub const FLUSH_POLL_DURATION: Duration = Duration::from_millis(10);

/// Poll interval of the durable backend pump when nothing signals new records (500ms)
pub const PUMP_POLL_DURATION: Duration = Duration::from_millis(500);

/// Sleep after a durable backend error before the pump tries again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

//! Epoch-millisecond clock used by the scheduler and result stamps.

use chrono::Utc;

/// Current time as epoch milliseconds. Scheduler timestamps (`run_at`,
/// worker deadlines) are all in this unit.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

//! Durable sleeps: `execute_sleep_duration` / `execute_sleep_until`.
//!
//! Spec §4.1 requires sleeps inside a workflow to be replay-safe: a replay
//! that resumes after the sleep has already elapsed must not re-sleep the
//! full duration. Grounded on `everruns-durable`'s timer/signal handling and
//! the teacher's `futures-timer` dependency for async sleeps without a full
//! tokio runtime assumption (kept here as a plain `tokio::time::sleep`,
//! since the whole crate already depends on the tokio runtime).

use chrono::{DateTime, Utc};

/// Sleep for a fixed duration, measured from "now" at the point this step
/// first executes (not from when the workflow itself started). On replay
/// after a restart, `wrap_durable_operation`'s memoization means this
/// function body does not re-run once its snapshot exists, so there is no
/// double-sleep: this function only ever executes once per logical sleep.
pub async fn execute_sleep_duration(duration: std::time::Duration) {
    tokio::time::sleep(duration).await;
}

/// Sleep until a fixed point in time. If `until` has already passed by the
/// time this executes, returns immediately.
pub async fn execute_sleep_until(until: DateTime<Utc>) {
    let now = Utc::now();
    if until <= now {
        return;
    }
    let remaining = (until - now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO);
    tokio::time::sleep(remaining).await;
}

//! The durable execution engine: memoization, retry, sleep, nested-workflow
//! dispatch, and finalize (spec §4.1).

pub mod durable_op;
pub mod finalize;
pub mod nested;
pub mod retry;
pub mod sleep;

pub use durable_op::{wrap_durable_operation, DurableContext};
pub use retry::{execute_step_with_retry, RetryPolicy};
pub use sleep::{execute_sleep_duration, execute_sleep_until};

//! Token usage accounting.
//!
//! Mirrors the teacher's `usage::Usage` accumulator: a small `Copy` struct
//! threaded through the LLM step and summed into `IterationState::accumulated_usage`
//! across the whole run (spec §3).

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Token usage for a single model call, or the running total across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt / input messages.
    pub input_tokens: u64,
    /// Tokens generated by the model.
    pub output_tokens: u64,
    /// `input_tokens + output_tokens`, kept denormalized so callers don't
    /// have to recompute it on every read.
    pub total_tokens: u64,
}

impl Usage {
    /// The zero usage value, used to seed `accumulated_usage`.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
        }
    }

    /// Construct from raw input/output token counts, computing the total.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

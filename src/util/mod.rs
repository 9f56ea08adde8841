//! Small shared utilities: output truncation.

pub mod truncate;

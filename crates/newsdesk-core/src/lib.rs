//! Foundational low-level utilities shared across Newsdesk crates.
//!
//! Provides the wall-clock helpers used for Slack request-skew checks and
//! latency bookkeeping.

pub mod time_utils;

pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, elapsed_ms_since};

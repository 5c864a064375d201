//! Reliability patterns for the callback bridge
//!
//! This module provides:
//! - [`RetryPolicy`] - Bounded lookup retry with exponential backoff

mod retry;

pub use retry::RetryPolicy;

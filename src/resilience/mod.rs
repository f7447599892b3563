//! Retry and backoff around calls that can fail transiently.

pub mod backoff;
pub mod retry;

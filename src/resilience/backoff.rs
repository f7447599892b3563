//! Rate limit backoff parsing.
//!
//! Upstream rate limit errors arrive as prose, e.g.
//! `"Rate limit is exceeded. Try again in 60 seconds."`. The advertised
//! wait plus a fixed buffer is how long to sleep before the next attempt.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Added on top of an advertised wait.
pub const RATE_LIMIT_BUFFER: Duration = Duration::from_secs(5);

/// Used when the message carries no usable wait.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

fn wait_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bin\s+(\d+)\s+seconds?\b").expect("static regex")
    })
}

/// How long to wait after a rate limit error: `N + 5` seconds when the
/// message says "in N seconds", otherwise 60 seconds. Never fails.
///
/// ```
/// use std::time::Duration;
/// use reconcile_engine::parse_wait;
///
/// assert_eq!(parse_wait("Rate limit is exceeded. Try again in 60 seconds."), Duration::from_secs(65));
/// assert_eq!(parse_wait("unparseable"), Duration::from_secs(60));
/// ```
#[must_use]
pub fn parse_wait(message: &str) -> Duration {
    parse_wait_with(message, RATE_LIMIT_BUFFER, DEFAULT_RATE_LIMIT_WAIT)
}

/// [`parse_wait`] with a caller-chosen buffer and default.
#[must_use]
pub fn parse_wait_with(message: &str, buffer: Duration, default: Duration) -> Duration {
    wait_pattern()
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map_or(default, |secs| Duration::from_secs(secs).saturating_add(buffer))
}

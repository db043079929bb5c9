//! Wall-clock helpers.
//!
//! All timestamps in Sigil are unix milliseconds as `u64`: link timestamps,
//! challenge freshness, invitation expiry, connection deadlines.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

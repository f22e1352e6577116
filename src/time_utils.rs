//! Time utility functions
//!
//! Presence timestamps travel as milliseconds since the Unix epoch on the wire
//! and in both stores.

use chrono::{DateTime, TimeZone, Utc};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert an epoch-millisecond value into a UTC datetime
///
/// Returns `None` for values chrono cannot represent.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

//! Unix-nanos timestamp helpers
//!
//! Internally every timestamp is an `i64` of nanoseconds since the epoch.
//! Wire messages use RFC 3339 in UTC.

use chrono::{SecondsFormat, TimeZone, Utc};

/// Format Unix nanos as RFC 3339 with millisecond precision
pub fn to_rfc3339(nanos: i64) -> String {
    Utc.timestamp_nanos(nanos)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

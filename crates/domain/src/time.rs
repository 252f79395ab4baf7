//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for receipt times, trigger times and audit records.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whole milliseconds elapsed between `from` and `to`, saturating at zero
/// when `to` precedes `from`.
#[must_use]
pub fn millis_between(from: Timestamp, to: Timestamp) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

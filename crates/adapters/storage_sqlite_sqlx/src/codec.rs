//! Column encodings shared by the repositories.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! precision, so lexical order in SQL matches chronological order.

use std::str::FromStr;

use chrono::SecondsFormat;
use greenhub_domain::time::Timestamp;
use sqlx::error::BoxDynError;

pub(crate) fn decode_error(err: impl Into<BoxDynError>) -> sqlx::Error {
    sqlx::Error::Decode(err.into())
}

pub(crate) fn timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.to_utc())
        .map_err(decode_error)
}

pub(crate) fn parse<T>(raw: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: Into<BoxDynError>,
{
    raw.parse().map_err(decode_error)
}

pub(crate) fn json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(raw).map_err(decode_error)
}

/// Clamp an unsigned count into `SQLite`'s signed integer range.
pub(crate) fn int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn uint(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

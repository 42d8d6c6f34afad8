// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp encoding shared by every table.
//!
//! All persisted timestamps use `YYYY-MM-DDTHH:MM:SS.mmmZ`, the same shape
//! SQLite produces with `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`, so string
//! comparison in SQL orders them chronologically.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Format a UTC instant for storage.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in storage format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp (or any RFC 3339 string) back into UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a provider unix timestamp in seconds.
pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

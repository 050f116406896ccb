//! Time utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time as an ISO-8601 string (`YYYY-MM-DDTHH:MM:SSZ`)
pub fn timestamp_now() -> String {
    format_timestamp(&Utc::now())
}

/// Format a UTC instant as an ISO-8601 string with whole seconds
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

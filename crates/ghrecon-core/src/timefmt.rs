//! Second-precision timestamp formatting.
//!
//! Time-series joins over the event stream key on the second, and the
//! API reports sub-second drift between observations of the same
//! instant. Every timestamp the engine stores or compares goes through
//! [`to_ymd_hms`] so that equality is exact at second precision.

use chrono::{DateTime, Utc};

/// Formats a timestamp as `YYYY-MM-DD HH:MM:SS` in UTC.
#[must_use]
pub fn to_ymd_hms(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Formats an optional timestamp, rendering absence as `null`.
#[must_use]
pub fn to_ymd_hms_or_null(dt: Option<DateTime<Utc>>) -> String {
    dt.map_or_else(|| "null".to_string(), to_ymd_hms)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn formats_at_second_precision() {
        let dt = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(to_ymd_hms(dt), "2024-01-01 00:00:00");
    }

    #[test]
    fn sub_second_drift_collapses() {
        let base = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).single().unwrap();
        let drifted = base + chrono::Duration::milliseconds(430);
        assert_eq!(to_ymd_hms(base), to_ymd_hms(drifted));
    }

    #[test]
    fn none_renders_as_null() {
        assert_eq!(to_ymd_hms_or_null(None), "null");
    }
}

//! Timestamp encoding shared by every persisted document.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed millisecond
//! precision (`2026-03-15T09:00:00.000Z`). The fixed width keeps lexical order
//! identical to chronological order, which lets both stores sort date fields
//! by comparing the raw JSON strings.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer, de};

/// Format a timestamp in the canonical stored form.
#[must_use]
pub fn format(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp (any offset) into UTC.
#[must_use]
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Serde serializer for `#[serde(with = "timestamp")]`.
///
/// # Errors
///
/// Returns the serializer's error if writing the string fails.
pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(time))
}

/// Serde deserializer for `#[serde(with = "timestamp")]`.
///
/// # Errors
///
/// Returns an error if the value is not an RFC 3339 string.
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_uses_fixed_millisecond_precision() {
        let time = Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap();
        assert_eq!(format(&time), "2026-03-15T09:00:00.000Z");
    }

    #[test]
    fn parse_normalizes_offsets_to_utc() {
        let parsed = parse("2026-03-15T10:00:00+01:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap());
    }

    #[test]
    fn lexical_order_matches_chronological_order() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 15, 9, 0, 0).unwrap();
        let later = earlier + chrono::Duration::milliseconds(500);
        assert!(format(&earlier) < format(&later));
    }
}

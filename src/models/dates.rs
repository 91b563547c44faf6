//! Serde helpers for the date fields persisted as ISO-8601 strings.
//!
//! Values are written as RFC 3339 with the shortest exact fraction, so a
//! stored timestamp reads back unchanged. Reading accepts RFC 3339 (with or
//! without fractional seconds) and plain `YYYY-MM-DD` dates, which are taken
//! as midnight UTC.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, TimeZone, Utc};

/// Parses a persisted date string.
#[must_use]
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[must_use]
pub fn format(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// `dd/mm/yyyy`, as used in observation strings.
#[must_use]
pub fn format_pt(value: &DateTime<Utc>) -> String {
    value.format("%d/%m/%Y").to_string()
}

/// First instant of the month containing `value`.
#[must_use]
pub fn month_start(value: &DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(value.year(), value.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(*value)
}

/// First instant of the month after the one containing `value`.
#[must_use]
pub fn next_month_start(value: &DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if value.month() == 12 {
        (value.year() + 1, 1)
    } else {
        (value.year(), value.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(*value)
}

#[must_use]
pub fn same_month(a: &DateTime<Utc>, b: &DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Required date field.
pub mod iso {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid date '{raw}'")))
    }
}

/// Optional date field. `null`, a missing field and an empty string all read
/// as `None`.
pub mod iso_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_str(&super::format(v)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid date '{raw}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_accepts_rfc3339_and_plain_dates() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(parse("2024-01-10T00:00:00.000Z"), Some(expected));
        assert_eq!(parse("2024-01-10T00:00:00Z"), Some(expected));
        assert_eq!(parse("2024-01-10"), Some(expected));
        assert_eq!(parse("10/01/2024"), None);
    }

    #[test]
    fn test_format_round_trips_subsecond_precision() {
        let value = Utc.timestamp_nanos(1_704_844_800_123_456_789);
        assert_eq!(parse(&format(&value)), Some(value));
    }

    #[test]
    fn test_month_boundaries() {
        let dec = Utc.with_ymd_and_hms(2024, 12, 17, 15, 0, 0).unwrap();
        assert_eq!(month_start(&dec), Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(next_month_start(&dec), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert!(same_month(&dec, &month_start(&dec)));
        assert_eq!(format_pt(&dec), "17/12/2024");
    }
}

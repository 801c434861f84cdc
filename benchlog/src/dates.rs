// Timestamps in the harness logs are ISO 8601 UTC instants, written by the harness as
// "2024-01-01T00:02:00Z".  Some tools write an explicit offset instead of "Z", some write no zone
// at all, and some add fractional seconds.  All of those are accepted.  Offsets are normalized to
// UTC, and timestamps without a zone are taken to be UTC.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub type Timestamp = DateTime<Utc>;

const HARNESS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// Zone-less forms, with "T" or " " between date and time.  "%.f" also matches no fraction.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp as written by the harness, any RFC 3339 timestamp, or a timestamp without a
/// zone, which is taken as UTC.  Surrounding whitespace is ignored.

pub fn parse_timestamp(s: &str) -> Result<Timestamp> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, HARNESS_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    bail!("Invalid timestamp '{s}'")
}

/// Format a timestamp the way the harness writes it.

pub fn format_timestamp(t: &Timestamp) -> String {
    t.format(HARNESS_FORMAT).to_string()
}

/// Construct a timestamp from components, `None` if they do not name a valid instant.

pub fn timestamp_from_ymdhms(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<Timestamp> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[test]
fn test_parse_timestamp() {
    let t = parse_timestamp("2024-01-01T00:02:00Z").unwrap();
    assert!(t == timestamp_from_ymdhms(2024, 1, 1, 0, 2, 0).unwrap());

    // Whitespace around the value is common after splitting on ','
    let t = parse_timestamp("  2024-01-01T00:02:00Z ").unwrap();
    assert!(t == timestamp_from_ymdhms(2024, 1, 1, 0, 2, 0).unwrap());

    // Offsets are normalized
    let t = parse_timestamp("2024-01-01T02:02:00+02:00").unwrap();
    assert!(t == timestamp_from_ymdhms(2024, 1, 1, 0, 2, 0).unwrap());

    // No zone means UTC
    let t = parse_timestamp("2024-01-01T00:02:00").unwrap();
    assert!(t == timestamp_from_ymdhms(2024, 1, 1, 0, 2, 0).unwrap());
    let t = parse_timestamp("2024-01-01 00:02:00.250").unwrap();
    assert!(t.timestamp_millis() == timestamp_from_ymdhms(2024, 1, 1, 0, 2, 0).unwrap().timestamp_millis() + 250);

    // Fractional seconds with a zone
    let t = parse_timestamp("2024-01-01T00:02:00.5Z").unwrap();
    assert!(t.timestamp_millis() % 1000 == 500);

    assert!(parse_timestamp("2024-01-01").is_err());
    assert!(parse_timestamp("2024-13-01T00:02:00Z").is_err());
    assert!(parse_timestamp("2024-01-01T00:02:00 junk").is_err());
    assert!(parse_timestamp("").is_err());
}

#[test]
fn test_format_timestamp() {
    let t = timestamp_from_ymdhms(2023, 6, 4, 5, 20, 33).unwrap();
    assert!(format_timestamp(&t) == "2023-06-04T05:20:33Z");
    assert!(parse_timestamp(&format_timestamp(&t)).unwrap() == t);
}

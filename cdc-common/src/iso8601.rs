//! ISO-8601 UTC timestamp formatting shared by `ChangeEvent.timestamp` and
//! by the normalizer's temporal-column rule (spec §3/§4.3): always
//! `YYYY-MM-DDTHH:MM:SS[.fff]Z`, never a `+00:00` offset suffix.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    format(ts).serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn epoch_zero_serializes_with_z_suffix() {
        let ts = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(format(&ts), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn year_9999_serializes_with_z_suffix() {
        let ts = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        let formatted = format(&ts);
        assert!(formatted.ends_with('Z'));
        assert!(formatted.starts_with("9999-12-31T23:59:59"));
    }

    #[test]
    fn round_trips() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap();
        let s = format(&ts);
        let parsed = DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc);
        assert_eq!(ts, parsed);
    }
}

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

pub struct TimeUtils;

impl TimeUtils {
    pub const MS_IN_S: i64 = 1000;
    pub const DAYS_IN_YEAR: f64 = 365.0;
    pub const EXPIRY_FORMAT: &str = "%Y-%m-%d";
    // Naive (offset-less) timestamps are read as UTC
    pub const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Always "YYYY-MM-DDTHH:MM:SS.sssZ"
pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses timestamps written by [`to_iso`] as well as offset-aware and naive
/// ISO-8601 strings. Returns `None` for anything else.
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TimeUtils::NAIVE_FORMAT) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, TimeUtils::EXPIRY_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whole seconds between `base` and `now`, rounded, never negative
pub fn elapsed_secs(base: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (now - base).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis as f64 / TimeUtils::MS_IN_S as f64).round() as u64
}

/// Tenor in years from now until an expiry date ("YYYY-MM-DD"), counted in
/// whole days and floored at `min_years`.
pub fn years_until(expiry: &str, now: DateTime<Utc>, min_years: f64) -> Result<f64> {
    let expiry_dt = parse_iso(expiry)
        .ok_or_else(|| anyhow!("malformed expiry '{}', expected YYYY-MM-DD", expiry))?;
    let days = (expiry_dt - now).num_days() as f64;
    Ok((days / TimeUtils::DAYS_IN_YEAR).max(min_years))
}

/// Serde adapter for optional timestamps: written as ISO strings, read
/// leniently (anything unparsable reads as absent).
pub mod iso_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&super::to_iso(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(Value::as_str).and_then(super::parse_iso))
    }
}

/// Serde adapter for required timestamps: a malformed or missing value reads as "now".
pub mod iso_or_now {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_iso(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw
            .as_ref()
            .and_then(Value::as_str)
            .and_then(super::parse_iso)
            .unwrap_or_else(super::now_utc))
    }
}

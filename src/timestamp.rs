use std::cmp;
use std::fmt;
use std::ops;
use std::time;

use chrono::{DateTime, NaiveDate, SecondsFormat};
use serde::{
    de::{Deserialize, Deserializer, Error, MapAccess, Unexpected, Visitor},
    ser::{Serialize, SerializeMap, Serializer},
};

pub(crate) const DATE_KEY: &str = "$date";

/// A date value, as the document store keeps it: signed milliseconds since the Unix epoch, UTC.
///
/// In the host's document format this is the single-key map `{"$date": <millis>}`. On
/// deserialization, the `$date` member may also be an RFC 3339 string.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Timestamp {
    millis: i64,
}

impl Timestamp {
    /// Create a timestamp from raw milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> Timestamp {
        Timestamp { millis }
    }

    pub fn from_sec(sec: i64) -> Timestamp {
        Timestamp {
            millis: sec.saturating_mul(1000),
        }
    }

    /// Minimum possible time that can be represented
    pub fn min_value() -> Timestamp {
        Timestamp { millis: i64::MIN }
    }

    /// Maximum possible time that can be represented
    pub fn max_value() -> Timestamp {
        Timestamp { millis: i64::MAX }
    }

    /// Return the number of milliseconds since January 1, 1970 0:00:00 UTC.
    pub fn timestamp_millis(&self) -> i64 {
        self.millis
    }

    /// Return the whole seconds since the Unix epoch, rounding towards negative infinity.
    pub fn timestamp_utc(&self) -> i64 {
        self.millis.div_euclid(1000)
    }

    /// Create a Timestamp based on the current system time. Fails if the system clock is set
    /// before the Unix Epoch.
    pub fn now() -> Option<Timestamp> {
        match time::SystemTime::now().duration_since(time::SystemTime::UNIX_EPOCH) {
            Ok(t) => i64::try_from(t.as_millis()).ok().map(Timestamp::from_millis),
            Err(_) => None,
        }
    }

    /// Parse either a full RFC 3339 date-time (`2014-03-01T10:12:00.250Z`) or a bare calendar
    /// date (`2014-03-01`, taken as midnight UTC).
    pub fn parse(s: &str) -> Option<Timestamp> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Timestamp::from_millis(dt.timestamp_millis()));
        }
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
        let midnight = date.and_hms_opt(0, 0, 0)?;
        Some(Timestamp::from_millis(midnight.and_utc().timestamp_millis()))
    }
}

impl ops::Add<i64> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: i64) -> Self {
        Timestamp {
            millis: self.millis + rhs,
        }
    }
}

impl ops::Sub<i64> for Timestamp {
    type Output = Timestamp;
    fn sub(self, rhs: i64) -> Self {
        Timestamp {
            millis: self.millis - rhs,
        }
    }
}

impl cmp::Ord for Timestamp {
    fn cmp(&self, other: &Timestamp) -> cmp::Ordering {
        self.millis.cmp(&other.millis)
    }
}

impl cmp::PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Timestamp) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match DateTime::from_timestamp_millis(self.millis) {
            Some(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "{} ms since epoch", self.millis),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(DATE_KEY, &self.millis)?;
        map.end()
    }
}

/// The `$date` member, either as raw milliseconds or as an RFC 3339 string.
pub(crate) struct DateMember(pub(crate) Timestamp);

impl<'de> Deserialize<'de> for DateMember {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MemberVisitor;

        impl<'de> Visitor<'de> for MemberVisitor {
            type Value = DateMember;

            fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt.write_str("milliseconds since the epoch or an RFC 3339 date")
            }

            fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(DateMember(Timestamp::from_millis(v)))
            }

            fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
                i64::try_from(v)
                    .map(|v| DateMember(Timestamp::from_millis(v)))
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
            }

            fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
                Timestamp::parse(v)
                    .map(DateMember)
                    .ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(MemberVisitor)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TimeVisitor;

        impl<'de> Visitor<'de> for TimeVisitor {
            type Value = Timestamp;

            fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(fmt, "a map with a single {} member", DATE_KEY)
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut time = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key != DATE_KEY {
                        return Err(A::Error::unknown_field(key.as_str(), &[DATE_KEY]));
                    }
                    let DateMember(t) = map.next_value()?;
                    time = Some(t);
                }
                time.ok_or_else(|| A::Error::missing_field(DATE_KEY))
            }
        }

        deserializer.deserialize_map(TimeVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn edge_cases() -> Vec<(&'static str, Timestamp)> {
        let mut test_cases = Vec::new();
        test_cases.push(("1970-01-01T00:00:00.000Z", Timestamp::from_millis(0)));
        test_cases.push(("1970-01-01T00:00:00.001Z", Timestamp::from_millis(1)));
        test_cases.push(("1969-12-31T23:59:59.999Z", Timestamp::from_millis(-1)));
        test_cases.push(("2014-03-01T10:12:00.250Z", Timestamp::from_millis(1_393_668_720_250)));
        test_cases
    }

    #[test]
    fn display_and_parse() {
        for (index, case) in edge_cases().iter().enumerate() {
            println!("Test #{}: '{}'", index, case.0);
            assert_eq!(case.1.to_string(), case.0);
            assert_eq!(Timestamp::parse(case.0), Some(case.1));
        }
    }

    #[test]
    fn parse_bare_date() {
        let t = Timestamp::parse("2014-03-01").unwrap();
        assert_eq!(t, Timestamp::from_sec(1_393_632_000));
        assert!(Timestamp::parse("2014-13-01").is_none());
        assert!(Timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn seconds_round_down() {
        assert_eq!(Timestamp::from_millis(1999).timestamp_utc(), 1);
        assert_eq!(Timestamp::from_millis(-1).timestamp_utc(), -1);
    }

    #[test]
    fn out_of_range_display() {
        let s = Timestamp::max_value().to_string();
        assert!(s.ends_with("ms since epoch"), "got {}", s);
    }

    #[test]
    fn host_format() {
        let t = Timestamp::from_millis(1_393_668_720_250);
        let enc = serde_json::to_string(&t).unwrap();
        assert_eq!(enc, r#"{"$date":1393668720250}"#);
        let dec: Timestamp = serde_json::from_str(&enc).unwrap();
        assert_eq!(dec, t);
        let dec: Timestamp = serde_json::from_str(r#"{"$date":"2014-03-01T10:12:00.250Z"}"#).unwrap();
        assert_eq!(dec, t);
        assert!(serde_json::from_str::<Timestamp>(r#"{"date":1}"#).is_err());
        assert!(serde_json::from_str::<Timestamp>(r#"{}"#).is_err());
    }
}

use crate::int::{parse_int_str, truncate_f64};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Integers with an absolute value at or above this are Unix milliseconds,
/// anything below is Unix seconds. 1e11 seconds is past the year 5000, while
/// 1e11 milliseconds is in 1973.
pub const MILLIS_THRESHOLD: i64 = 100_000_000_000;

const SPACE_SEPARATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A timestamp that may arrive as RFC 3339, `"YYYY-MM-DD HH:MM:SS"` (UTC),
/// Unix seconds, Unix milliseconds, or `null`.
///
/// The zero value (`None` inside) comes from `null` or an empty string and
/// displays as an empty string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlexibleTime(pub Option<DateTime<Utc>>);

impl FlexibleTime {
    pub fn get(self) -> Option<DateTime<Utc>> {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    /// Interpret an integer as seconds or milliseconds depending on magnitude.
    pub fn from_unix(value: i64) -> Option<Self> {
        let instant = if value.unsigned_abs() >= MILLIS_THRESHOLD as u64 {
            DateTime::from_timestamp_millis(value)
        } else {
            DateTime::from_timestamp(value, 0)
        };
        instant.map(|t| Self(Some(t)))
    }

    fn parse_str(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Some(Self(None));
        }
        if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(Self(Some(t.with_timezone(&Utc))));
        }
        if let Ok(t) = NaiveDateTime::parse_from_str(trimmed, SPACE_SEPARATED_FORMAT) {
            return Some(Self(Some(t.and_utc())));
        }
        parse_int_str(trimmed).and_then(Self::from_unix)
    }
}

impl From<DateTime<Utc>> for FlexibleTime {
    fn from(value: DateTime<Utc>) -> Self {
        Self(Some(value))
    }
}

impl fmt::Display for FlexibleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => Ok(()),
        }
    }
}

impl Serialize for FlexibleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for FlexibleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FlexibleTimeVisitor)
    }
}

struct FlexibleTimeVisitor;

impl<'de> Visitor<'de> for FlexibleTimeVisitor {
    type Value = FlexibleTime;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an RFC 3339 string, a \"YYYY-MM-DD HH:MM:SS\" string, a Unix timestamp, or null")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        FlexibleTime::from_unix(v).ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .ok()
            .and_then(FlexibleTime::from_unix)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        truncate_f64(v)
            .and_then(FlexibleTime::from_unix)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Float(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        FlexibleTime::parse_str(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FlexibleTime(None))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FlexibleTime(None))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        FlexibleTime::deserialize(deserializer)
    }
}

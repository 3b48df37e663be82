use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// An integer that may arrive as a JSON number, a numeric string, or `null`.
///
/// Fractional values are truncated toward zero. `null` and the empty string
/// decode to `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlexibleInt(pub i64);

impl FlexibleInt {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for FlexibleInt {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<FlexibleInt> for i64 {
    fn from(value: FlexibleInt) -> Self {
        value.0
    }
}

impl fmt::Display for FlexibleInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for FlexibleInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for FlexibleInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FlexibleIntVisitor)
    }
}

pub(crate) fn truncate_f64(value: f64) -> Option<i64> {
    // i64::MAX is not representable as f64; anything at or above 2^63 overflows.
    if !value.is_finite() || value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return None;
    }
    Some(value.trunc() as i64)
}

pub(crate) fn parse_int_str(raw: &str) -> Option<i64> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    raw.parse::<f64>().ok().and_then(truncate_f64)
}

struct FlexibleIntVisitor;

impl<'de> Visitor<'de> for FlexibleIntVisitor {
    type Value = FlexibleInt;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer, a float, a numeric string, or null")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(FlexibleInt(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .map(FlexibleInt)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        truncate_f64(v)
            .map(FlexibleInt)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Float(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            return Ok(FlexibleInt(0));
        }
        parse_int_str(trimmed)
            .map(FlexibleInt)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FlexibleInt(0))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FlexibleInt(0))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        FlexibleInt::deserialize(deserializer)
    }
}

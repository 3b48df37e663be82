use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A string that may arrive as a JSON string, number, boolean, or `null`.
///
/// Numbers keep their JSON rendering, booleans become `"true"`/`"false"`,
/// and `null` becomes the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlexibleString(pub String);

impl FlexibleString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for FlexibleString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FlexibleString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<FlexibleString> for String {
    fn from(value: FlexibleString) -> Self {
        value.0
    }
}

impl fmt::Display for FlexibleString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for FlexibleString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FlexibleString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FlexibleStringVisitor)
    }
}

struct FlexibleStringVisitor;

impl<'de> Visitor<'de> for FlexibleStringVisitor {
    type Value = FlexibleString;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean, or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(FlexibleString(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(FlexibleString(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(FlexibleString(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(FlexibleString(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(FlexibleString(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(FlexibleString(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FlexibleString::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FlexibleString::default())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        FlexibleString::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> String {
        serde_json::from_str::<FlexibleString>(json)
            .unwrap()
            .into_inner()
    }

    #[test]
    fn coerces_scalars() {
        assert_eq!(decode("\"x\""), "x");
        assert_eq!(decode("123"), "123");
        assert_eq!(decode("-4"), "-4");
        assert_eq!(decode("1.5"), "1.5");
        assert_eq!(decode("true"), "true");
        assert_eq!(decode("false"), "false");
    }

    #[test]
    fn null_is_empty() {
        assert_eq!(decode("null"), "");
        let list: Vec<FlexibleString> = serde_json::from_str("[null, 7]").unwrap();
        assert_eq!(list, vec![FlexibleString::default(), FlexibleString::from("7")]);
    }

    #[test]
    fn rejects_containers() {
        assert!(serde_json::from_str::<FlexibleString>("[\"a\"]").is_err());
        assert!(serde_json::from_str::<FlexibleString>("{}").is_err());
    }
}

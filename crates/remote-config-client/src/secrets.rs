use crate::{RemoteConfigError, RemoteConfigResponse, RemoteConfigResult};
use flexible_scalars::FlexibleString;
use serde_json::Value;
use std::collections::BTreeMap;

/// Template entry holding the per-market client secrets.
pub const CLIENT_SECRETS_ENTRY: &str = "client_secrets";

/// Market key -> client id -> secret, decoded from the `client_secrets` entry.
///
/// The entry is a JSON string whose values are themselves either JSON strings
/// or inline objects. Values that are empty or do not decode to an object
/// leave the market with no secrets rather than failing the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSecretTable {
    markets: BTreeMap<String, BTreeMap<String, String>>,
}

impl ClientSecretTable {
    pub fn from_response(response: &RemoteConfigResponse) -> RemoteConfigResult<Self> {
        let raw = response
            .entries
            .get(CLIENT_SECRETS_ENTRY)
            .ok_or_else(|| RemoteConfigError::MissingEntry(CLIENT_SECRETS_ENTRY.to_string()))?;
        Self::parse(raw)
    }

    pub fn parse(raw: &str) -> RemoteConfigResult<Self> {
        let outer: BTreeMap<String, Value> = serde_json::from_str(raw)?;
        let markets = outer
            .into_iter()
            .map(|(market, value)| (market.to_ascii_uppercase(), decode_market(value)))
            .collect();
        Ok(Self { markets })
    }

    /// First non-empty secret for `client_id` across `candidates`, in order.
    ///
    /// Returns the matching market key alongside the secret.
    pub fn lookup(&self, candidates: &[String], client_id: &str) -> Option<(&str, &str)> {
        candidates.iter().find_map(|key| {
            let (market, secrets) = self.markets.get_key_value(&key.to_ascii_uppercase())?;
            secrets
                .get(client_id)
                .map(String::as_str)
                .filter(|secret| !secret.trim().is_empty())
                .map(|secret| (market.as_str(), secret))
        })
    }

    pub fn markets(&self) -> impl Iterator<Item = &str> {
        self.markets.keys().map(String::as_str)
    }
}

fn decode_market(value: Value) -> BTreeMap<String, String> {
    let object = match value {
        Value::String(s) if s.trim().is_empty() => return BTreeMap::new(),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed) => parsed,
            Err(_) => return BTreeMap::new(),
        },
        other => other,
    };

    serde_json::from_value::<BTreeMap<String, FlexibleString>>(object)
        .map(|m| m.into_iter().map(|(k, v)| (k, v.into_inner())).collect())
        .unwrap_or_default()
}

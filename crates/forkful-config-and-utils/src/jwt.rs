//! Unverified JWT claim decoding.
//!
//! Claims are read for expiry estimation and client-id discovery only. The
//! signature is never checked: we are not the issuer and hold no key material,
//! so nothing decoded here may be used for an authorization decision.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use flexible_scalars::{FlexibleInt, FlexibleString};
use serde::Deserialize;

/// The subset of claims we care about. Both are independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenClaims {
    pub exp: Option<i64>,
    pub client_id: Option<String>,
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    exp: FlexibleInt,
    #[serde(default)]
    client_id: FlexibleString,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Decode the payload segment of a three-segment token.
///
/// Returns `None` for anything that is not `header.payload.signature` with a
/// base64url JSON object in the middle.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut parts = token.trim().split('.');
    let (_, payload, _) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() => (h, p, s),
        _ => return None,
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let raw: RawClaims = serde_json::from_slice(&bytes).ok()?;

    Some(TokenClaims {
        exp: Some(raw.exp.get()).filter(|secs| *secs > 0),
        client_id: Some(raw.client_id.into_inner()).filter(|id| !id.is_empty()),
    })
}

/// Expiry from the `exp` claim, if the token carries one.
pub fn expiry(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token).and_then(|claims| claims.expires_at())
}

/// True when `value` decodes as a three-segment token.
pub fn looks_like_jwt(value: &str) -> bool {
    decode_claims(value).is_some()
}

#[cfg(test)]
pub(crate) fn encode_for_test(claims: &serde_json::Value) -> String {
    format!(
        "x.{}.y",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap())
    )
}

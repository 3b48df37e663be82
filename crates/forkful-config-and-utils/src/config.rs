//! Persisted configuration shape.

use crate::jwt;
use crate::market::{MarketProfile, DEFAULT_OAUTH_CLIENT_ID};
use crate::CoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Current on-disk schema version.
pub const CONFIG_VERSION: u32 = 1;

/// Default API base URL (can be overridden at compile time via FORKFUL_DEFAULT_BASE_URL env var).
pub const DEFAULT_BASE_URL: &str = match option_env!("FORKFUL_DEFAULT_BASE_URL") {
    Some(url) => url,
    None => "https://mj.fd-api.com/api/v5/",
};

/// Default target market.
pub const DEFAULT_COUNTRY_ISO: &str = "AT";

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub providers: Providers,
}

/// Per-provider configuration blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Providers {
    #[serde(default)]
    pub foodora: ProviderConfig,
}

/// A client secret obtained from a remote-config fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSecret {
    pub secret: String,
    pub fetched_at: DateTime<Utc>,
}

/// An MFA challenge waiting for an OTP from a later invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMfaState {
    pub mfa_token: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub email: String,
    /// Username the challenge was issued for; the resume must use the same one.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub rate_limit_reset_secs: u64,
    pub created_at: DateTime<Utc>,
}

/// Settings and session state for one delivery provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default = "default_country")]
    pub target_country_iso: String,
    /// Explicitly configured secret. Always wins over env, cache, and fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Client id the explicit secret belongs to. Unset means every client id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_client_id: Option<String>,
    /// Secrets obtained by remote fetch, keyed by OAuth client id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cached_client_secrets: BTreeMap<String, CachedSecret>,
    /// Country code -> extra remote-config keys to try for that market.
    #[serde(default = "default_remote_config_aliases")]
    pub remote_config_aliases: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_mfa: Option<PendingMfaState>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies_by_host: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_user_agent: Option<String>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_country() -> String {
    DEFAULT_COUNTRY_ISO.to_string()
}

fn default_remote_config_aliases() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([("AT".to_string(), vec!["MJ".to_string()])])
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            device_id: String::new(),
            target_country_iso: default_country(),
            client_secret: None,
            client_secret_client_id: None,
            oauth_client_id: None,
            cached_client_secrets: BTreeMap::new(),
            remote_config_aliases: default_remote_config_aliases(),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            pending_mfa: None,
            cookies_by_host: BTreeMap::new(),
            http_user_agent: None,
        }
    }
}

/// Keys that only appear at the top level of the legacy flat format.
const LEGACY_KEYS: &[&str] = &[
    "base_url",
    "device_id",
    "target_country_iso",
    "client_secret",
    "access_token",
    "refresh_token",
];

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            providers: Providers::default(),
        }
    }

    /// Parse a config file, accepting the legacy flat provider format.
    ///
    /// Returns the config and whether it had to be migrated.
    pub fn from_json_str(content: &str) -> CoreResult<(Self, bool)> {
        let value: serde_json::Value = serde_json::from_str(content)?;

        let is_legacy = value
            .as_object()
            .map(|obj| {
                !obj.contains_key("providers") && LEGACY_KEYS.iter().any(|k| obj.contains_key(*k))
            })
            .unwrap_or(false);

        if is_legacy {
            let foodora: ProviderConfig = serde_json::from_value(value)?;
            let config = Self {
                version: CONFIG_VERSION,
                providers: Providers { foodora },
            };
            return Ok((config, true));
        }

        let config: Config = serde_json::from_value(value)?;
        let outdated = config.version != CONFIG_VERSION;
        Ok((
            Self {
                version: CONFIG_VERSION,
                ..config
            },
            outdated,
        ))
    }
}

impl ProviderConfig {
    /// Both tokens are present.
    pub fn has_session(&self) -> bool {
        non_empty(&self.access_token).is_some() && non_empty(&self.refresh_token).is_some()
    }

    /// Known expiry: the stored one, else the access token's `exp` claim.
    pub fn access_token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .or_else(|| non_empty(&self.access_token).and_then(jwt::expiry))
    }

    /// True unless we positively know the access token is still valid at `now`.
    pub fn token_likely_expired(&self, now: DateTime<Utc>) -> bool {
        if non_empty(&self.access_token).is_none() {
            return true;
        }
        match self.access_token_expires_at() {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }

    /// Host part of the base URL, or empty when it does not parse.
    pub fn cookie_host(&self) -> String {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Stored cookie header for the API host.
    pub fn cookie_header(&self) -> Option<&str> {
        self.cookies_by_host
            .get(&self.cookie_host())
            .map(String::as_str)
            .filter(|h| !h.is_empty())
    }

    /// The explicit secret, if one is set and belongs to `client_id`.
    pub fn explicit_client_secret(&self, client_id: &str) -> Option<&str> {
        let secret = non_empty(&self.client_secret)?;
        match non_empty(&self.client_secret_client_id) {
            Some(owner) if owner != client_id => None,
            _ => Some(secret),
        }
    }

    /// Bind an unowned explicit secret to the configured client id.
    ///
    /// Older files scoped the secret by `oauth_client_id`, which later logins
    /// and fetches rewrite. Returns whether anything changed.
    pub fn pin_client_secret_owner(&mut self) -> bool {
        if non_empty(&self.client_secret).is_none()
            || non_empty(&self.client_secret_client_id).is_some()
        {
            return false;
        }
        match non_empty(&self.oauth_client_id).map(str::to_string) {
            Some(owner) => {
                self.client_secret_client_id = Some(owner);
                true
            }
            None => false,
        }
    }

    pub fn oauth_client_id_or_default(&self) -> &str {
        non_empty(&self.oauth_client_id).unwrap_or(DEFAULT_OAUTH_CLIENT_ID)
    }

    pub fn market(&self) -> MarketProfile {
        MarketProfile::for_country(&self.target_country_iso)
            .with_user_agent(self.http_user_agent.as_deref())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_default_provider() {
        let cfg = ProviderConfig::default();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.target_country_iso, "AT");
        assert_eq!(cfg.remote_config_aliases["AT"], vec!["MJ".to_string()]);
        assert!(!cfg.has_session());
    }

    #[test]
    fn test_current_format_parses() {
        let content = json!({
            "version": 1,
            "providers": {"foodora": {"device_id": "dev", "access_token": "a"}}
        })
        .to_string();
        let (config, migrated) = Config::from_json_str(&content).unwrap();
        assert!(!migrated);
        assert_eq!(config.providers.foodora.device_id, "dev");
        assert_eq!(config.providers.foodora.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_legacy_flat_format_is_migrated() {
        let content = json!({
            "base_url": "https://hu.fd-api.com/api/v5/",
            "device_id": "legacy-dev",
            "access_token": "a",
            "refresh_token": "r"
        })
        .to_string();
        let (config, migrated) = Config::from_json_str(&content).unwrap();
        assert!(migrated);
        let foodora = &config.providers.foodora;
        assert_eq!(foodora.base_url, "https://hu.fd-api.com/api/v5/");
        assert_eq!(foodora.device_id, "legacy-dev");
        assert!(foodora.has_session());
    }

    #[test]
    fn test_empty_object_is_not_legacy() {
        let (config, migrated) = Config::from_json_str("{}").unwrap();
        assert!(!migrated);
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_token_likely_expired_prefers_stored_expiry() {
        let now = Utc::now();
        let mut cfg = ProviderConfig {
            access_token: Some("opaque".into()),
            expires_at: Some(now - Duration::seconds(1)),
            ..Default::default()
        };
        assert!(cfg.token_likely_expired(now));

        cfg.expires_at = Some(now + Duration::minutes(10));
        assert!(!cfg.token_likely_expired(now));
    }

    #[test]
    fn test_token_likely_expired_falls_back_to_jwt() {
        let now = Utc::now();
        let fresh = jwt::encode_for_test(&json!({"exp": (now + Duration::hours(1)).timestamp()}));
        let stale = jwt::encode_for_test(&json!({"exp": (now - Duration::hours(1)).timestamp()}));

        let mut cfg = ProviderConfig {
            access_token: Some(fresh),
            ..Default::default()
        };
        assert!(!cfg.token_likely_expired(now));

        cfg.access_token = Some(stale);
        assert!(cfg.token_likely_expired(now));

        cfg.access_token = Some("opaque".into());
        assert!(cfg.token_likely_expired(now));

        cfg.access_token = None;
        assert!(cfg.token_likely_expired(now));
    }

    #[test]
    fn test_cookie_host() {
        let mut cfg = ProviderConfig {
            base_url: "https://mj.fd-api.com/api/v5/".into(),
            ..Default::default()
        };
        assert_eq!(cfg.cookie_host(), "mj.fd-api.com");

        cfg.base_url = "not a url".into();
        assert_eq!(cfg.cookie_host(), "");
    }

    #[test]
    fn test_oauth_client_id_default() {
        let mut cfg = ProviderConfig::default();
        assert_eq!(cfg.oauth_client_id_or_default(), "android");
        cfg.oauth_client_id = Some("  ".into());
        assert_eq!(cfg.oauth_client_id_or_default(), "android");
        cfg.oauth_client_id = Some("web".into());
        assert_eq!(cfg.oauth_client_id_or_default(), "web");
    }

    #[test]
    fn test_explicit_client_secret_scope() {
        let mut cfg = ProviderConfig {
            client_secret: Some("s1".into()),
            ..Default::default()
        };
        assert_eq!(cfg.explicit_client_secret("android"), Some("s1"));
        assert_eq!(cfg.explicit_client_secret("web"), Some("s1"));

        cfg.client_secret_client_id = Some("web".into());
        assert_eq!(cfg.explicit_client_secret("web"), Some("s1"));
        assert_eq!(cfg.explicit_client_secret("android"), None);

        cfg.client_secret = Some(" ".into());
        assert_eq!(cfg.explicit_client_secret("web"), None);
    }

    #[test]
    fn test_pin_client_secret_owner() {
        let mut cfg = ProviderConfig {
            client_secret: Some("s1".into()),
            oauth_client_id: Some("web".into()),
            ..Default::default()
        };
        assert!(cfg.pin_client_secret_owner());
        assert_eq!(cfg.client_secret_client_id.as_deref(), Some("web"));
        assert!(!cfg.pin_client_secret_owner());

        // Rewriting the login client id no longer moves the secret
        cfg.oauth_client_id = Some("android".into());
        assert_eq!(cfg.explicit_client_secret("android"), None);

        let mut unscoped = ProviderConfig {
            client_secret: Some("s1".into()),
            ..Default::default()
        };
        assert!(!unscoped.pin_client_secret_owner());
        assert!(unscoped.client_secret_client_id.is_none());
    }

    #[test]
    fn test_market_uses_configured_user_agent() {
        let cfg = ProviderConfig {
            http_user_agent: Some("Mozilla/5.0".into()),
            ..Default::default()
        };
        let market = cfg.market();
        assert_eq!(market.app_headers.app_name, "at.mjam");
        assert_eq!(market.app_headers.user_agent, "Mozilla/5.0");
    }
}

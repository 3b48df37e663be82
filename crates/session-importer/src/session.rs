use crate::cookies::CookieJar;
use crate::{ImportError, ImportResult};
use chrono::{DateTime, Utc};
use forkful_config_and_utils::{jwt, ConfigStore};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

/// Cookie names checked for an access token before falling back to any
/// token-shaped value.
const TOKEN_COOKIES: &[&str] = &["token", "access_token"];
const REFRESH_COOKIE: &str = "refresh_token";

/// Browser-side session material for one API host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    /// API host without port.
    pub host: String,
    /// Normalized `a=1; b=2` header.
    pub cookie_header: String,
    pub user_agent: String,
}

impl Session {
    pub fn new(base_url: &str, cookie_header: &str, user_agent: &str) -> ImportResult<Self> {
        Ok(Self {
            host: host_from_base_url(base_url)?,
            cookie_header: CookieJar::parse(cookie_header).to_header(),
            user_agent: user_agent.trim().to_string(),
        })
    }
}

/// Host component of an API base URL, port stripped.
pub fn host_from_base_url(base_url: &str) -> ImportResult<String> {
    let base_url = base_url.trim();
    if base_url.is_empty() {
        return Err(ImportError::Validation("base URL missing".to_string()));
    }
    let url = Url::parse(base_url)
        .map_err(|e| ImportError::Validation(format!("invalid base URL: {e}")))?;
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ImportError::Validation("host missing".to_string()))
}

/// Result of an import, ready to be written into the config store.
#[derive(Clone, Serialize)]
pub struct ImportedSession {
    pub session: Session,
    #[serde(skip)]
    pub access_token: Option<String>,
    #[serde(skip)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub client_id: Option<String>,
    pub cookie_count: usize,
}

impl std::fmt::Debug for ImportedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedSession")
            .field("session", &self.session.host)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("client_id", &self.client_id)
            .field("cookie_count", &self.cookie_count)
            .finish()
    }
}

impl ImportedSession {
    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Store the cookies under the host and any discovered tokens.
    pub fn apply(&self, store: &mut ConfigStore) {
        if !self.session.cookie_header.is_empty() {
            store.set_cookie_header(&self.session.host, &self.session.cookie_header);
        }
        if !self.session.user_agent.is_empty() {
            store.provider_mut().http_user_agent = Some(self.session.user_agent.clone());
        }
        if let Some(access_token) = &self.access_token {
            store.store_tokens(
                access_token,
                self.refresh_token.as_deref().unwrap_or_default(),
                self.expires_at,
                self.client_id.as_deref(),
            );
        }
        info!(
            host = %self.session.host,
            cookie_count = self.cookie_count,
            has_token = self.has_token(),
            "Imported session"
        );
    }
}

/// Converts harvested cookies and bearer tokens into an [`ImportedSession`].
pub struct SessionImporter;

impl SessionImporter {
    pub fn import(
        base_url: &str,
        cookie_header: Option<&str>,
        bearer: Option<&str>,
        user_agent: Option<&str>,
    ) -> ImportResult<ImportedSession> {
        let jar = CookieJar::parse(cookie_header.unwrap_or_default());
        let bearer = bearer.map(strip_bearer).filter(|b| !b.is_empty());

        if jar.is_empty() && bearer.is_none() {
            return Err(ImportError::Validation(
                "cookie header or bearer token required".to_string(),
            ));
        }

        let session = Session {
            host: host_from_base_url(base_url)?,
            cookie_header: jar.to_header(),
            user_agent: user_agent.unwrap_or_default().trim().to_string(),
        };

        let access_token = bearer
            .map(str::to_string)
            .or_else(|| discover_token(&jar));
        let refresh_token = jar
            .get(REFRESH_COOKIE)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let claims = access_token
            .as_deref()
            .and_then(jwt::decode_claims)
            .unwrap_or_default();
        debug!(
            has_exp = claims.exp.is_some(),
            has_client_id = claims.client_id.is_some(),
            "Decoded imported token claims"
        );

        Ok(ImportedSession {
            session,
            access_token,
            refresh_token,
            expires_at: claims.expires_at(),
            client_id: claims.client_id,
            cookie_count: jar.len(),
        })
    }
}

fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    if value.eq_ignore_ascii_case("bearer") {
        return "";
    }
    match value.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => value,
    }
}

fn discover_token(jar: &CookieJar) -> Option<String> {
    TOKEN_COOKIES
        .iter()
        .filter_map(|name| jar.get(name))
        .find(|v| !v.is_empty())
        .or_else(|| {
            jar.iter()
                .filter(|(name, _)| *name != REFRESH_COOKIE)
                .map(|(_, value)| value)
                .find(|value| jwt::looks_like_jwt(value))
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use forkful_config_and_utils::Config;

    const BASE: &str = "https://mj.fd-api.com:8443/api/v5/";

    fn jwt(claims: serde_json::Value) -> String {
        format!("h.{}.s", URL_SAFE_NO_PAD.encode(claims.to_string()))
    }

    #[test]
    fn test_host_strips_port() {
        assert_eq!(host_from_base_url(BASE).unwrap(), "mj.fd-api.com");
        assert_eq!(
            host_from_base_url("").unwrap_err().to_string(),
            "Validation error: base URL missing"
        );
    }

    #[test]
    fn test_requires_some_material() {
        let err = SessionImporter::import(BASE, Some(" ; "), Some("Bearer "), None).unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn test_bearer_wins_and_claims_decoded() {
        let token = jwt(serde_json::json!({"exp": 1734652800, "client_id": "web"}));
        let imported = SessionImporter::import(
            BASE,
            Some("token=other; refresh_token=rt"),
            Some(&format!("Bearer {token}")),
            Some(" Mozilla/5.0 "),
        )
        .unwrap();

        assert_eq!(imported.access_token.as_deref(), Some(token.as_str()));
        assert_eq!(imported.refresh_token.as_deref(), Some("rt"));
        assert_eq!(imported.client_id.as_deref(), Some("web"));
        assert_eq!(imported.expires_at.unwrap().timestamp(), 1734652800);
        assert_eq!(imported.session.user_agent, "Mozilla/5.0");
    }

    #[test]
    fn test_token_cookie_then_any_jwt_cookie() {
        let imported = SessionImporter::import(BASE, Some("token=opaque; x=1"), None, None).unwrap();
        assert_eq!(imported.access_token.as_deref(), Some("opaque"));
        assert!(imported.expires_at.is_none());

        let token = jwt(serde_json::json!({"exp": 1734652800}));
        let header = format!("session_id=abc; device_token={token}");
        let imported = SessionImporter::import(BASE, Some(&header), None, None).unwrap();
        assert_eq!(imported.access_token.as_deref(), Some(token.as_str()));
        assert!(imported.client_id.is_none());

        let imported = SessionImporter::import(BASE, Some("session_id=abc"), None, None).unwrap();
        assert!(!imported.has_token());
    }

    #[test]
    fn test_apply_writes_store() {
        let mut store = ConfigStore::in_memory(Config::new());
        let imported = SessionImporter::import(
            "https://mj.fd-api.com/api/v5/",
            Some("a=1 ; access_token=acc; refresh_token=ref; a=2"),
            None,
            Some("UA"),
        )
        .unwrap();
        imported.apply(&mut store);

        let provider = store.provider();
        assert_eq!(
            provider.cookie_header(),
            Some("a=2; access_token=acc; refresh_token=ref")
        );
        assert_eq!(provider.http_user_agent.as_deref(), Some("UA"));
        assert!(provider.has_session());
        assert!(store.is_dirty());
    }
}

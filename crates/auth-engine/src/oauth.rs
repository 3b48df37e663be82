//! Token endpoint client.
//!
//! Speaks `POST {base}/oauth2/token` the way the Android app does: form body,
//! device id under both `X-Device` and `Device-Id`, the client id again as
//! `X-FP-API-KEY`, and the market's `App-Name`.

use crate::{AuthError, AuthResult};
use chrono::{DateTime, Duration, Utc};
use flexible_scalars::{FlexibleInt, FlexibleString};
use forkful_config_and_utils::{
    jwt, summarize_response_body, until_cancelled, AppHeaders, HttpFailure, ProviderConfig,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Fixed scope sent with every password grant.
pub const PASSWORD_SCOPE: &str = "API_CUSTOMER";

/// `code` value of a 401 body that carries an MFA challenge.
pub const MFA_TRIGGERED_CODE: &str = "mfa_triggered";

/// Response header telling us how long until another OTP may be requested.
pub const RATE_LIMIT_RESET_HEADER: &str = "ratelimit-reset";

/// Used when the rate-limit header is absent or unparsable.
pub const DEFAULT_RATE_LIMIT_RESET_SECS: u64 = 30;

const TOKEN_PATH: &str = "oauth2/token";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Tokens issued by a successful grant.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds; zero or negative when the server did not say.
    pub expires_in: i64,
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl AuthToken {
    /// `now + expires_in` when the server gave a positive lifetime.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.expires_in > 0).then(|| now + Duration::seconds(self.expires_in))
    }

    /// Expiry from `expires_in`, else from the access token's `exp` claim.
    pub fn resolve_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_at(now)
            .or_else(|| jwt::expiry(&self.access_token))
    }
}

/// Server demand for a one-time passcode before the login completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MfaChallenge {
    pub channel: String,
    pub email: String,
    pub mfa_token: String,
    pub rate_limit_reset_secs: u64,
}

/// Result of a grant that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Token(AuthToken),
    Challenge(MfaChallenge),
}

/// OTP material for resuming a challenge.
#[derive(Debug, Clone)]
pub struct OtpSubmission {
    pub method: String,
    pub code: String,
    pub mfa_token: String,
}

/// Password grant parameters.
#[derive(Clone)]
pub struct PasswordGrant {
    pub username: String,
    pub password: String,
    pub client_secret: String,
    pub client_id: String,
    pub otp: Option<OtpSubmission>,
}

impl PasswordGrant {
    /// Form body for the token endpoint.
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", "password".to_string()),
            ("username", self.username.clone()),
            ("password", self.password.clone()),
            ("client_secret", self.client_secret.clone()),
            ("client_id", self.client_id.clone()),
            ("scope", PASSWORD_SCOPE.to_string()),
        ];
        if let Some(otp) = &self.otp {
            form.push(("mfa_token", otp.mfa_token.clone()));
        }
        form
    }
}

/// Refresh grant parameters.
#[derive(Clone)]
pub struct RefreshGrant {
    pub refresh_token: String,
    pub client_secret: String,
    pub client_id: String,
}

impl RefreshGrant {
    pub fn form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", self.refresh_token.clone()),
            ("client_secret", self.client_secret.clone()),
            ("client_id", self.client_id.clone()),
        ]
    }
}

/// Connection settings for [`TokenClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub device_id: String,
    pub app_headers: AppHeaders,
    /// Cookies previously harvested for the API host, replayed on every call.
    pub cookie_header: Option<String>,
}

impl ClientOptions {
    pub fn from_provider(provider: &ProviderConfig) -> Self {
        Self {
            base_url: provider.base_url.clone(),
            device_id: provider.device_id.clone(),
            app_headers: provider.market().app_headers,
            cookie_header: provider.cookie_header().map(str::to_string),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: FlexibleString,
    #[serde(default)]
    refresh_token: FlexibleString,
    #[serde(default)]
    expires_in: FlexibleInt,
}

#[derive(Deserialize)]
struct MfaBody {
    #[serde(default)]
    code: FlexibleString,
    #[serde(default)]
    metadata: Option<MfaMetadata>,
}

#[derive(Deserialize)]
struct MfaMetadata {
    #[serde(default)]
    more_information: Option<MfaInformation>,
}

#[derive(Deserialize)]
struct MfaInformation {
    #[serde(default)]
    channel: FlexibleString,
    #[serde(default)]
    email: FlexibleString,
    #[serde(default)]
    mfa_token: FlexibleString,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: FlexibleString,
}

/// Extract an MFA challenge from a 401 body, if it is one.
///
/// A body with the sentinel code but an empty challenge token is not a
/// challenge.
pub fn parse_mfa_challenge(body: &str, rate_limit_reset: Option<&str>) -> Option<MfaChallenge> {
    let raw: MfaBody = serde_json::from_str(body).ok()?;
    if raw.code.as_str() != MFA_TRIGGERED_CODE {
        return None;
    }
    let info = raw.metadata?.more_information?;
    if info.mfa_token.as_str().trim().is_empty() {
        return None;
    }

    let rate_limit_reset_secs = rate_limit_reset
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT_RESET_SECS);

    Some(MfaChallenge {
        channel: info.channel.into_inner(),
        email: info.email.into_inner(),
        mfa_token: info.mfa_token.into_inner(),
        rate_limit_reset_secs,
    })
}

/// Map a non-2xx, non-MFA response onto the error taxonomy.
pub fn classify_failure(method: &str, url: &str, status: u16, body: &str) -> AuthError {
    let failure = HttpFailure::new(method, url, status, body);
    let invalid_client = matches!(status, 400 | 401)
        && serde_json::from_str::<OAuthErrorBody>(body)
            .map(|b| b.error.as_str() == "invalid_client")
            .unwrap_or(false);

    if invalid_client {
        AuthError::InvalidClient(failure)
    } else {
        AuthError::Transport(failure)
    }
}

fn decode_token(body: &str) -> AuthResult<AuthToken> {
    let data: TokenResponse = serde_json::from_str(body)?;
    if data.access_token.is_empty() {
        return Err(AuthError::Decode(
            "token response has no access_token".to_string(),
        ));
    }
    Ok(AuthToken {
        access_token: data.access_token.into_inner(),
        refresh_token: data.refresh_token.into_inner(),
        expires_in: data.expires_in.get(),
    })
}

/// Interpret a password-grant response, wherever it came from.
pub fn interpret_grant_response(
    url: &str,
    status: u16,
    rate_limit_reset: Option<&str>,
    body: &str,
) -> AuthResult<GrantOutcome> {
    if (200..300).contains(&status) {
        return decode_token(body).map(GrantOutcome::Token);
    }
    if status == 401 {
        if let Some(challenge) = parse_mfa_challenge(body, rate_limit_reset) {
            return Ok(GrantOutcome::Challenge(challenge));
        }
    }
    Err(classify_failure("POST", url, status, body))
}

struct RawResponse {
    status: u16,
    rate_limit_reset: Option<String>,
    body: String,
}

/// Client for the OAuth token endpoint.
pub struct TokenClient {
    http_client: Client,
    token_url: Url,
    options: ClientOptions,
}

impl TokenClient {
    /// Validate options and build a client. No network I/O.
    pub fn new(options: ClientOptions) -> AuthResult<Self> {
        if options.base_url.trim().is_empty() {
            return Err(AuthError::Validation("base URL missing".to_string()));
        }
        if options.device_id.trim().is_empty() {
            return Err(AuthError::Validation("device ID missing".to_string()));
        }

        let mut base = Url::parse(options.base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let token_url = base.join(TOKEN_PATH)?;

        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            token_url,
            options,
        })
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Headers the app sends with a grant for `client_id`.
    pub fn grant_headers(
        &self,
        client_id: &str,
        otp: Option<&OtpSubmission>,
    ) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-Device", self.options.device_id.clone()),
            ("Device-Id", self.options.device_id.clone()),
            ("X-FP-API-KEY", client_id.to_string()),
            ("App-Name", self.options.app_headers.app_name.clone()),
            ("User-Agent", self.options.app_headers.user_agent.clone()),
            ("Accept", "application/json".to_string()),
        ];
        if let Some(cookies) = self.options.cookie_header.as_deref() {
            headers.push(("Cookie", cookies.to_string()));
        }
        if let Some(otp) = otp {
            headers.push(("X-OTP-Method", otp.method.clone()));
            headers.push(("X-OTP", otp.code.clone()));
        }
        headers
    }

    async fn post_form(
        &self,
        grant_type: &str,
        form: &[(&'static str, String)],
        headers: Vec<(&'static str, String)>,
        cancel: &CancellationToken,
    ) -> AuthResult<RawResponse> {
        debug!(
            url = %self.token_url,
            grant_type = grant_type,
            "Requesting OAuth token"
        );

        let mut request = self.http_client.post(self.token_url.clone()).form(form);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let raw = until_cancelled(cancel, async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let rate_limit_reset = response
                .headers()
                .get(RATE_LIMIT_RESET_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await?;
            Ok::<_, AuthError>(RawResponse {
                status,
                rate_limit_reset,
                body,
            })
        })
        .await
        .ok_or(AuthError::Cancelled)??;

        if !(200..300).contains(&raw.status) {
            warn!(
                status = raw.status,
                grant_type = grant_type,
                body_summary = %summarize_response_body(&raw.body),
                "OAuth grant not accepted"
            );
        }
        Ok(raw)
    }

    /// Password grant, optionally resuming an MFA challenge.
    pub async fn password_grant(
        &self,
        grant: &PasswordGrant,
        cancel: &CancellationToken,
    ) -> AuthResult<GrantOutcome> {
        let headers = self.grant_headers(&grant.client_id, grant.otp.as_ref());
        let raw = self
            .post_form("password", &grant.form(), headers, cancel)
            .await?;
        interpret_grant_response(
            self.token_url.as_str(),
            raw.status,
            raw.rate_limit_reset.as_deref(),
            &raw.body,
        )
    }

    /// Refresh grant. MFA is never expected here, so any non-2xx is a failure.
    pub async fn refresh_grant(
        &self,
        grant: &RefreshGrant,
        cancel: &CancellationToken,
    ) -> AuthResult<AuthToken> {
        let headers = self.grant_headers(&grant.client_id, None);
        let raw = self
            .post_form("refresh_token", &grant.form(), headers, cancel)
            .await?;
        if !(200..300).contains(&raw.status) {
            return Err(classify_failure(
                "POST",
                self.token_url.as_str(),
                raw.status,
                &raw.body,
            ));
        }
        decode_token(&raw.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn options(base_url: &str) -> ClientOptions {
        ClientOptions {
            base_url: base_url.to_string(),
            device_id: "dev".to_string(),
            app_headers: AppHeaders {
                app_name: "at.mjam".to_string(),
                fp_api_key: "android".to_string(),
                user_agent: "ua".to_string(),
            },
            cookie_header: None,
        }
    }

    #[test]
    fn test_expires_at() {
        let now = Utc.timestamp_opt(1000, 0).unwrap();
        let token = AuthToken {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_in: 10,
        };
        assert_eq!(token.expires_at(now), Some(Utc.timestamp_opt(1010, 0).unwrap()));

        let unknown = AuthToken {
            expires_in: 0,
            ..token
        };
        assert_eq!(unknown.expires_at(now), None);
        assert_eq!(unknown.resolve_expiry(now), None);
    }

    #[test]
    fn test_token_url_gets_trailing_slash() {
        let client = TokenClient::new(options("https://mj.fd-api.com/api/v5")).unwrap();
        assert_eq!(
            client.token_url().as_str(),
            "https://mj.fd-api.com/api/v5/oauth2/token"
        );
        let client = TokenClient::new(options("https://mj.fd-api.com/api/v5/")).unwrap();
        assert_eq!(
            client.token_url().as_str(),
            "https://mj.fd-api.com/api/v5/oauth2/token"
        );
    }

    #[test]
    fn test_validation_before_network() {
        let err = TokenClient::new(options(" ")).err().unwrap();
        assert_eq!(err.to_string(), "Validation error: base URL missing");

        let mut opts = options("https://x/");
        opts.device_id.clear();
        let err = TokenClient::new(opts).err().unwrap();
        assert_eq!(err.to_string(), "Validation error: device ID missing");
    }

    #[test]
    fn test_parse_mfa_challenge() {
        let body = r#"{"code":"mfa_triggered","metadata":{"more_information":{"channel":"sms","email":"e@x","mfa_token":"tok"}}}"#;
        let challenge = parse_mfa_challenge(body, Some("13")).unwrap();
        assert_eq!(
            challenge,
            MfaChallenge {
                channel: "sms".into(),
                email: "e@x".into(),
                mfa_token: "tok".into(),
                rate_limit_reset_secs: 13,
            }
        );

        assert_eq!(parse_mfa_challenge(body, None).unwrap().rate_limit_reset_secs, 30);
        assert_eq!(
            parse_mfa_challenge(body, Some("soon")).unwrap().rate_limit_reset_secs,
            30
        );
    }

    #[test]
    fn test_mfa_requires_token_and_code() {
        let empty_token = r#"{"code":"mfa_triggered","metadata":{"more_information":{"mfa_token":""}}}"#;
        assert!(parse_mfa_challenge(empty_token, None).is_none());

        let other_code = r#"{"code":"bad_password","metadata":{"more_information":{"mfa_token":"t"}}}"#;
        assert!(parse_mfa_challenge(other_code, None).is_none());

        assert!(parse_mfa_challenge("<html>", None).is_none());
    }

    #[test]
    fn test_classify_invalid_client() {
        let body = r#"{"error":"invalid_client"}"#;
        assert!(matches!(
            classify_failure("POST", "x", 401, body),
            AuthError::InvalidClient(_)
        ));
        assert!(matches!(
            classify_failure("POST", "x", 500, body),
            AuthError::Transport(_)
        ));
        assert!(matches!(
            classify_failure("POST", "x", 401, r#"{"error":"invalid_grant"}"#),
            AuthError::Transport(_)
        ));
    }

    #[test]
    fn test_interpret_grant_response() {
        let ok = interpret_grant_response(
            "u",
            200,
            None,
            r#"{"access_token":"a","refresh_token":"r","expires_in":"3600"}"#,
        )
        .unwrap();
        assert_eq!(
            ok,
            GrantOutcome::Token(AuthToken {
                access_token: "a".into(),
                refresh_token: "r".into(),
                expires_in: 3600,
            })
        );

        let err = interpret_grant_response("u", 200, None, r#"{"refresh_token":"r"}"#).unwrap_err();
        assert_eq!(err.code(), "decode");

        let err = interpret_grant_response("u", 403, None, "blocked").unwrap_err();
        assert_eq!(err.to_string(), "POST u: HTTP 403: blocked");
    }

    #[test]
    fn test_grant_headers_and_forms() {
        let client = TokenClient::new(options("https://x/")).unwrap();
        let otp = OtpSubmission {
            method: "sms".into(),
            code: "123456".into(),
            mfa_token: "tok".into(),
        };
        let headers = client.grant_headers("android", Some(&otp));
        let get = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("X-Device"), Some("dev"));
        assert_eq!(get("Device-Id"), Some("dev"));
        assert_eq!(get("X-FP-API-KEY"), Some("android"));
        assert_eq!(get("App-Name"), Some("at.mjam"));
        assert_eq!(get("X-OTP-Method"), Some("sms"));
        assert_eq!(get("X-OTP"), Some("123456"));
        assert_eq!(get("Cookie"), None);

        let grant = PasswordGrant {
            username: "u".into(),
            password: "p".into(),
            client_secret: "s".into(),
            client_id: "android".into(),
            otp: Some(otp),
        };
        let form = grant.form();
        assert!(form.contains(&("scope", "API_CUSTOMER".to_string())));
        assert!(form.contains(&("mfa_token", "tok".to_string())));

        let refresh = RefreshGrant {
            refresh_token: "rr".into(),
            client_secret: "s".into(),
            client_id: "android".into(),
        };
        assert!(refresh.form().contains(&("grant_type", "refresh_token".to_string())));
    }
}

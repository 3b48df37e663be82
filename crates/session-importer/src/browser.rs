//! Flows that borrow a real browser through a collaborator script.
//!
//! Some deployments refuse the direct password grant without a device trust
//! signal. These flows let a browser make the request (or read its cookie
//! store) and feed the result back into the same shapes the direct client
//! produces.

use crate::cookies::CookieJar;
use crate::session::{host_from_base_url, Session};
use crate::{Collaborator, CollaboratorRequest, ImportError, ImportResult, NpmProject};
use auth_engine::{
    interpret_grant_response, AuthError, ClientOptions, GrantOutcome, OtpCode, OtpSubmission,
    PasswordGrant, SecretResolver, TokenClient, RATE_LIMIT_RESET_HEADER,
};
use chrono::Utc;
use flexible_scalars::{FlexibleInt, FlexibleString};
use forkful_config_and_utils::{ConfigStore, PendingMfaState};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cookies read from a browser profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieExtraction {
    pub cookie_header: String,
    pub cookie_count: usize,
}

#[derive(Deserialize)]
struct CookieExtractionOutput {
    #[serde(default)]
    cookie_header: FlexibleString,
}

#[derive(Deserialize)]
struct BrowserGrantOutput {
    #[serde(default)]
    status: FlexibleInt,
    #[serde(default)]
    body: FlexibleString,
    #[serde(default)]
    headers: BTreeMap<String, FlexibleString>,
    #[serde(default)]
    cookie_header: FlexibleString,
    #[serde(default)]
    user_agent: FlexibleString,
}

#[derive(Clone)]
pub struct BrowserLoginRequest {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub otp: Option<OtpCode>,
}

/// Outcome of a browser-driven password grant.
#[derive(Debug, Clone)]
pub struct BrowserLogin {
    pub outcome: GrantOutcome,
    pub session: Session,
}

pub struct BrowserAutomation {
    collaborator: Arc<dyn Collaborator>,
    working_dir: PathBuf,
    program: Option<String>,
    timeout: Option<Duration>,
    project: Option<NpmProject>,
}

impl BrowserAutomation {
    pub fn new(collaborator: Arc<dyn Collaborator>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            collaborator,
            working_dir: working_dir.into(),
            program: None,
            timeout: None,
            project: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// npm dependencies installed next to the script before it runs.
    pub fn with_project(mut self, project: NpmProject) -> Self {
        self.project = Some(project);
        self
    }

    fn request(&self, script: &Path, input: serde_json::Value) -> CollaboratorRequest {
        let mut request = CollaboratorRequest::new(script, &self.working_dir, input);
        if let Some(program) = &self.program {
            request = request.with_program(program.clone());
        }
        if let Some(timeout) = self.timeout {
            request = request.with_timeout(timeout);
        }
        if let Some(project) = &self.project {
            request = request.with_project(project.clone());
        }
        request
    }

    /// Read cookies for `target_url` from a browser profile.
    pub async fn extract_cookies(
        &self,
        script: &Path,
        target_url: &str,
        profile: Option<&str>,
        cancel: &CancellationToken,
    ) -> ImportResult<CookieExtraction> {
        let target_url = target_url.trim();
        if target_url.is_empty() {
            return Err(ImportError::Validation("target URL missing".to_string()));
        }

        let mut input = json!({ "target_url": target_url });
        if let Some(profile) = profile.map(str::trim).filter(|p| !p.is_empty()) {
            input["profile"] = json!(profile);
        }

        let value = self
            .collaborator
            .run(&self.request(script, input), cancel)
            .await?;
        let output: CookieExtractionOutput = serde_json::from_value(value)?;

        let jar = CookieJar::parse(output.cookie_header.as_str());
        if jar.is_empty() {
            return Err(ImportError::Decode(format!(
                "no cookies returned for {target_url}"
            )));
        }

        debug!(cookie_count = jar.len(), "Extracted browser cookies");
        Ok(CookieExtraction {
            cookie_header: jar.to_header(),
            cookie_count: jar.len(),
        })
    }

    /// Run the password grant inside a browser and record what it returns.
    ///
    /// Harvested cookies and user agent are stored even when the grant itself
    /// is rejected. An OTP consumes the pending challenge up front, like the
    /// direct flow. A rejected client secret is refetched and the grant run
    /// once more with the same OTP; a second rejection surfaces as a
    /// transport error.
    pub async fn password_grant(
        &self,
        script: &Path,
        store: &mut ConfigStore,
        resolver: &SecretResolver,
        request: &BrowserLoginRequest,
        cancel: &CancellationToken,
    ) -> ImportResult<BrowserLogin> {
        let provider = store.provider();
        if provider.base_url.trim().is_empty() {
            return Err(ImportError::Validation("base URL missing".to_string()));
        }
        if provider.device_id.trim().is_empty() {
            return Err(ImportError::Validation("device ID missing".to_string()));
        }
        let base_url = provider.base_url.clone();
        host_from_base_url(&base_url)?;

        let client = TokenClient::new(ClientOptions::from_provider(provider))?;

        let otp = match &request.otp {
            Some(code) => {
                let pending = store.take_pending_mfa().ok_or(AuthError::NoPendingChallenge)?;
                Some(OtpSubmission {
                    method: if code.method.trim().is_empty() {
                        pending.channel
                    } else {
                        code.method.trim().to_string()
                    },
                    code: code.code.trim().to_string(),
                    mfa_token: pending.mfa_token,
                })
            }
            None => None,
        };

        let resolved = resolver.resolve(store, &request.client_id, cancel).await?;
        let mut grant = PasswordGrant {
            username: request.username.trim().to_string(),
            password: request.password.clone(),
            client_secret: resolved.secret,
            client_id: request.client_id.clone(),
            otp,
        };

        let attempt = self
            .attempt(script, store, &client, &base_url, &grant, cancel)
            .await;
        let (session, outcome) = match attempt {
            Err(ImportError::Auth(AuthError::InvalidClient(failure))) => {
                warn!(
                    status = failure.status,
                    source = %resolved.source,
                    client_id = %grant.client_id,
                    "Client secret rejected in browser grant, refetching"
                );
                let fresh = resolver
                    .force_refetch(store, &grant.client_id, cancel)
                    .await?;
                grant.client_secret = fresh.secret;
                self.attempt(script, store, &client, &base_url, &grant, cancel)
                    .await
                    .map_err(|err| match err {
                        ImportError::Auth(err) => ImportError::Auth(err.into_transport()),
                        other => other,
                    })?
            }
            other => other?,
        };

        match &outcome {
            GrantOutcome::Token(token) => {
                store.store_tokens(
                    &token.access_token,
                    &token.refresh_token,
                    token.resolve_expiry(Utc::now()),
                    Some(&grant.client_id),
                );
                info!(client_id = %grant.client_id, "Browser login successful");
            }
            GrantOutcome::Challenge(challenge) => {
                store.set_pending_mfa(PendingMfaState {
                    mfa_token: challenge.mfa_token.clone(),
                    channel: challenge.channel.clone(),
                    email: challenge.email.clone(),
                    username: grant.username.clone(),
                    rate_limit_reset_secs: challenge.rate_limit_reset_secs,
                    created_at: Utc::now(),
                });
                info!(channel = %challenge.channel, "MFA challenge issued");
            }
        }

        Ok(BrowserLogin { outcome, session })
    }

    /// One browser round trip of `grant`. Cookies and user agent are stored
    /// before the response is interpreted.
    async fn attempt(
        &self,
        script: &Path,
        store: &mut ConfigStore,
        client: &TokenClient,
        base_url: &str,
        grant: &PasswordGrant,
        cancel: &CancellationToken,
    ) -> ImportResult<(Session, GrantOutcome)> {
        let form: BTreeMap<&str, String> = grant.form().into_iter().collect();
        let headers: BTreeMap<&str, String> = client
            .grant_headers(&grant.client_id, grant.otp.as_ref())
            .into_iter()
            .collect();
        let input = json!({
            "token_url": client.token_url().as_str(),
            "form": form,
            "headers": headers,
        });

        info!(host = %client.token_url().host_str().unwrap_or_default(), "Requesting password grant through browser");
        let value = self
            .collaborator
            .run(&self.request(script, input), cancel)
            .await?;
        let output: BrowserGrantOutput = serde_json::from_value(value)?;

        let session = Session::new(
            base_url,
            output.cookie_header.as_str(),
            output.user_agent.as_str(),
        )?;
        if !session.cookie_header.is_empty() {
            store.set_cookie_header(&session.host, &session.cookie_header);
        }
        if !session.user_agent.is_empty() {
            store.provider_mut().http_user_agent = Some(session.user_agent.clone());
        }

        let rate_limit_reset = output
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(RATE_LIMIT_RESET_HEADER))
            .map(|(_, value)| value.as_str());

        let status = u16::try_from(output.status.get())
            .map_err(|_| ImportError::Decode(format!("invalid status {}", output.status)))?;
        let outcome = interpret_grant_response(
            client.token_url().as_str(),
            status,
            rate_limit_reset,
            output.body.as_str(),
        )?;

        Ok((session, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CollaboratorError;
    use async_trait::async_trait;
    use forkful_config_and_utils::Config;
    use remote_config_client::{
        RemoteConfigResponse, RemoteConfigResult, RemoteSecretSource, CLIENT_SECRETS_ENTRY,
    };
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned results in order and records the inputs it was given.
    struct FakeCollaborator {
        replies: Mutex<VecDeque<Result<Value, CollaboratorError>>>,
        seen: Mutex<Vec<Value>>,
    }

    impl FakeCollaborator {
        fn replying(reply: Result<Value, CollaboratorError>) -> Arc<Self> {
            Self::replying_all(vec![reply])
        }

        fn replying_all(replies: Vec<Result<Value, CollaboratorError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn inputs(&self) -> Vec<Value> {
            self.seen.lock().unwrap().clone()
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last_input(&self) -> Value {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Collaborator for FakeCollaborator {
        async fn run(
            &self,
            request: &CollaboratorRequest,
            _cancel: &CancellationToken,
        ) -> Result<Value, CollaboratorError> {
            self.seen.lock().unwrap().push(request.input.clone());
            self.replies.lock().unwrap().pop_front().unwrap()
        }
    }

    /// Remote config serving `android` -> `fresh` for Austria.
    struct FakeRemote {
        calls: AtomicUsize,
    }

    impl FakeRemote {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteSecretSource for FakeRemote {
        async fn fetch_remote_config(
            &self,
            _cancel: &CancellationToken,
        ) -> RemoteConfigResult<RemoteConfigResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteConfigResponse {
                state: "UPDATE".into(),
                template_version: "7".into(),
                entries: BTreeMap::from([(
                    CLIENT_SECRETS_ENTRY.to_string(),
                    r#"{"AT":"{\"android\":\"fresh\"}"}"#.to_string(),
                )]),
            })
        }
    }

    fn resolver(remote: Arc<FakeRemote>) -> SecretResolver {
        SecretResolver::with_env_secret(remote, None)
    }

    /// Device id set and a stale explicit secret `s`.
    fn store() -> ConfigStore {
        let mut config = Config::new();
        config.providers.foodora.device_id = "dev".into();
        config.providers.foodora.client_secret = Some("s".into());
        ConfigStore::in_memory(config)
    }

    fn login_request(otp: Option<OtpCode>) -> BrowserLoginRequest {
        BrowserLoginRequest {
            username: "u@example.com".into(),
            password: "p".into(),
            client_id: "android".into(),
            otp,
        }
    }

    #[tokio::test]
    async fn test_extract_cookies_normalizes() {
        let fake = FakeCollaborator::replying(Ok(json!({
            "cookie_header": " a=1 ;b=2; a=3 ",
            "cookie_count": 3
        })));
        let browser = BrowserAutomation::new(fake.clone(), "/tmp/forkful-test");

        let extraction = browser
            .extract_cookies(
                Path::new("cookies.js"),
                "https://www.foodora.at/",
                Some("Default"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(extraction.cookie_header, "a=3; b=2");
        assert_eq!(extraction.cookie_count, 2);
        assert_eq!(
            fake.last_input(),
            json!({"target_url": "https://www.foodora.at/", "profile": "Default"})
        );
    }

    #[tokio::test]
    async fn test_extract_cookies_requires_target() {
        let fake = FakeCollaborator::replying(Ok(json!({})));
        let browser = BrowserAutomation::new(fake.clone(), "/tmp/forkful-test");

        let err = browser
            .extract_cookies(Path::new("cookies.js"), "  ", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: target URL missing");
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_reported_error_surfaces_verbatim() {
        let fake = FakeCollaborator::replying(Err(CollaboratorError::Reported("no cookies".into())));
        let browser = BrowserAutomation::new(fake, "/tmp/forkful-test");

        let err = browser
            .extract_cookies(Path::new("c.js"), "https://x/", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Collaborator(CollaboratorError::Reported(ref m)) if m == "no cookies"
        ));
    }

    #[tokio::test]
    async fn test_browser_grant_token() {
        let fake = FakeCollaborator::replying(Ok(json!({
            "status": 200,
            "body": "{\"access_token\":\"a\",\"refresh_token\":\"r\",\"expires_in\":60}",
            "headers": {},
            "cookie_header": "cf=1; cf=2",
            "user_agent": " Mozilla/5.0 "
        })));
        let browser = BrowserAutomation::new(fake.clone(), "/tmp/forkful-test");
        let mut store = store();

        let login = browser
            .password_grant(
                Path::new("login.js"),
                &mut store,
                &resolver(FakeRemote::new()),
                &login_request(None),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(login.outcome, GrantOutcome::Token(ref t) if t.access_token == "a"));
        assert_eq!(login.session.host, "mj.fd-api.com");
        let provider = store.provider();
        assert!(provider.has_session());
        assert_eq!(provider.cookie_header(), Some("cf=2"));
        assert_eq!(provider.http_user_agent.as_deref(), Some("Mozilla/5.0"));

        let input = fake.last_input();
        assert_eq!(input["form"]["grant_type"], "password");
        assert_eq!(input["form"]["scope"], "API_CUSTOMER");
        assert_eq!(input["headers"]["X-Device"], "dev");
        assert_eq!(input["headers"]["Device-Id"], "dev");
        assert!(input["token_url"].as_str().unwrap().ends_with("/oauth2/token"));
    }

    #[tokio::test]
    async fn test_browser_grant_challenge() {
        let body = json!({
            "code": "mfa_triggered",
            "metadata": {"more_information": {"channel": "email", "email": "e@x", "mfa_token": "tok"}}
        })
        .to_string();
        let fake = FakeCollaborator::replying(Ok(json!({
            "status": "401",
            "body": body,
            "headers": {"RateLimit-Reset": "45"}
        })));
        let browser = BrowserAutomation::new(fake, "/tmp/forkful-test");
        let mut store = store();

        let login = browser
            .password_grant(
                Path::new("login.js"),
                &mut store,
                &resolver(FakeRemote::new()),
                &login_request(None),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        match login.outcome {
            GrantOutcome::Challenge(challenge) => assert_eq!(challenge.rate_limit_reset_secs, 45),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let pending = store.provider().pending_mfa.clone().unwrap();
        assert_eq!(pending.mfa_token, "tok");
        assert_eq!(pending.username, "u@example.com");
    }

    #[tokio::test]
    async fn test_browser_grant_failure_is_transport() {
        let fake = FakeCollaborator::replying(Ok(json!({
            "status": 403,
            "body": "blocked by edge",
            "cookie_header": "cf=1"
        })));
        let browser = BrowserAutomation::new(fake, "/tmp/forkful-test");
        let mut store = store();

        let err = browser
            .password_grant(
                Path::new("login.js"),
                &mut store,
                &resolver(FakeRemote::new()),
                &login_request(None),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "transport");
        assert!(err.to_string().contains("HTTP 403: blocked by edge"));
        // Cookies are kept for the next attempt
        assert_eq!(store.provider().cookie_header(), Some("cf=1"));
    }

    #[tokio::test]
    async fn test_browser_grant_validation() {
        let fake = FakeCollaborator::replying(Ok(json!({})));
        let browser = BrowserAutomation::new(fake.clone(), "/tmp/forkful-test");
        let mut store = store();
        store.provider_mut().base_url = "file:///tmp/x".into();

        let err = browser
            .password_grant(
                Path::new("login.js"),
                &mut store,
                &resolver(FakeRemote::new()),
                &login_request(None),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: host missing");
        assert_eq!(fake.calls(), 0);

        store.provider_mut().base_url = "https://mj.fd-api.com/api/v5/".into();
        let err = browser
            .password_grant(
                Path::new("login.js"),
                &mut store,
                &resolver(FakeRemote::new()),
                &login_request(Some(OtpCode {
                    method: "sms".into(),
                    code: "1".into(),
                })),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Auth(AuthError::NoPendingChallenge)));
    }

    fn invalid_client_reply() -> Result<Value, CollaboratorError> {
        Ok(json!({
            "status": 401,
            "body": "{\"error\":\"invalid_client\"}",
            "cookie_header": "cf=1"
        }))
    }

    #[tokio::test]
    async fn test_browser_grant_recovers_rotated_secret() {
        let fake = FakeCollaborator::replying_all(vec![
            invalid_client_reply(),
            Ok(json!({
                "status": 200,
                "body": "{\"access_token\":\"a\",\"refresh_token\":\"r\",\"expires_in\":60}",
                "cookie_header": "cf=2"
            })),
        ]);
        let remote = FakeRemote::new();
        let browser = BrowserAutomation::new(fake.clone(), "/tmp/forkful-test");
        let mut store = store();
        store.set_pending_mfa(PendingMfaState {
            mfa_token: "tok".into(),
            channel: "sms".into(),
            email: String::new(),
            username: "u@example.com".into(),
            rate_limit_reset_secs: 30,
            created_at: Utc::now(),
        });

        let login = browser
            .password_grant(
                Path::new("login.js"),
                &mut store,
                &resolver(remote.clone()),
                &login_request(Some(OtpCode {
                    method: String::new(),
                    code: "123456".into(),
                })),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(login.outcome, GrantOutcome::Token(ref t) if t.access_token == "a"));
        assert_eq!(remote.calls(), 1);

        let inputs = fake.inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0]["form"]["client_secret"], "s");
        assert_eq!(inputs[1]["form"]["client_secret"], "fresh");
        // The consumed challenge is replayed on the retry
        for input in &inputs {
            assert_eq!(input["form"]["mfa_token"], "tok");
            assert_eq!(input["headers"]["X-OTP"], "123456");
            assert_eq!(input["headers"]["X-OTP-Method"], "sms");
        }

        let provider = store.provider();
        assert!(provider.has_session());
        assert_eq!(provider.cached_client_secrets["android"].secret, "fresh");
        assert_eq!(provider.cookie_header(), Some("cf=2"));
    }

    #[tokio::test]
    async fn test_browser_grant_second_rejection_is_transport() {
        let fake =
            FakeCollaborator::replying_all(vec![invalid_client_reply(), invalid_client_reply()]);
        let remote = FakeRemote::new();
        let browser = BrowserAutomation::new(fake.clone(), "/tmp/forkful-test");
        let mut store = store();

        let err = browser
            .password_grant(
                Path::new("login.js"),
                &mut store,
                &resolver(remote.clone()),
                &login_request(None),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "transport");
        assert_eq!(fake.calls(), 2);
        assert_eq!(remote.calls(), 1);
        assert!(!store.provider().has_session());
    }
}

//! Session manager: drives the auth FSM through password, MFA resume, and
//! refresh grants against the token endpoint.
//!
//! All persisted state lives in the caller's [`ConfigStore`]; the manager only
//! holds the in-process FSM. Every mutation marks the store dirty and the
//! caller flushes it once at the end of the invocation, including after a
//! failed resume so the single-use challenge stays cleared.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState};
use crate::oauth::{
    AuthToken, ClientOptions, GrantOutcome, MfaChallenge, OtpSubmission, PasswordGrant,
    RefreshGrant, TokenClient,
};
use crate::secret_resolver::SecretResolver;
use crate::{AuthError, AuthResult};
use chrono::Utc;
use forkful_config_and_utils::{ConfigStore, PendingMfaState};
use std::future::Future;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One-time passcode supplied to resume a pending challenge.
#[derive(Debug, Clone)]
pub struct OtpCode {
    /// Delivery method, e.g. `sms`. Empty means "the channel the challenge used".
    pub method: String,
    pub code: String,
}

#[derive(Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub client_id: Option<String>,
    pub otp: Option<OtpCode>,
}

/// Result of a login attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(AuthToken),
    /// An OTP is required; the challenge has been persisted.
    ChallengeIssued(MfaChallenge),
}

pub struct SessionManager {
    resolver: SecretResolver,
    fsm: Mutex<AuthMachine>,
}

impl SessionManager {
    pub fn new(resolver: SecretResolver) -> Self {
        Self {
            resolver,
            fsm: Mutex::new(AuthMachine::new()),
        }
    }

    pub fn resolver(&self) -> &SecretResolver {
        &self.resolver
    }

    /// Get the current FSM state.
    pub fn fsm_state(&self) -> AuthState {
        let fsm = self.fsm.lock().unwrap();
        AuthState::from(fsm.state())
    }

    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
        }

        Ok(new_state)
    }

    fn reject<T>(&self, err: AuthError) -> AuthResult<T> {
        if let Err(fsm_err) = self.transition(&AuthMachineInput::Rejected) {
            debug!(error = %fsm_err, "Rejected transition not applied");
        }
        Err(err)
    }

    /// Password login, or MFA resume when `request.otp` is set.
    ///
    /// A resume consumes the persisted challenge before any network call, so
    /// it is cleared whether the attempt succeeds or not.
    pub async fn login(
        &self,
        store: &mut ConfigStore,
        request: &LoginRequest,
        cancel: &CancellationToken,
    ) -> AuthResult<LoginOutcome> {
        let client = TokenClient::new(ClientOptions::from_provider(store.provider()))?;
        let client_id = request
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| store.provider().oauth_client_id_or_default())
            .to_string();

        let (username, otp) = match &request.otp {
            Some(code) => {
                let pending = store
                    .take_pending_mfa()
                    .ok_or(AuthError::NoPendingChallenge)?;
                let username = if request.username.trim().is_empty() {
                    pending.username.clone()
                } else {
                    request.username.trim().to_string()
                };
                let method = if code.method.trim().is_empty() {
                    pending.channel.clone()
                } else {
                    code.method.trim().to_string()
                };
                self.transition(&AuthMachineInput::SubmitOtp)?;
                let otp = OtpSubmission {
                    method,
                    code: code.code.trim().to_string(),
                    mfa_token: pending.mfa_token,
                };
                (username, Some(otp))
            }
            None => {
                self.transition(&AuthMachineInput::SubmitPassword)?;
                (request.username.trim().to_string(), None)
            }
        };

        if username.is_empty() {
            return self.reject(AuthError::Validation("username missing".to_string()));
        }
        if request.password.is_empty() {
            return self.reject(AuthError::Validation("password missing".to_string()));
        }

        info!(
            client_id = %client_id,
            host = client.token_url().host_str().unwrap_or_default(),
            resume = otp.is_some(),
            "Requesting password grant"
        );

        let base = PasswordGrant {
            username: username.clone(),
            password: request.password.clone(),
            client_secret: String::new(),
            client_id: client_id.clone(),
            otp,
        };
        let result = self
            .with_secret_recovery(store, &client_id, cancel, |secret| {
                let grant = PasswordGrant {
                    client_secret: secret,
                    ..base.clone()
                };
                let client = &client;
                async move { client.password_grant(&grant, cancel).await }
            })
            .await;

        match result {
            Ok(GrantOutcome::Token(token)) => {
                store.store_tokens(
                    &token.access_token,
                    &token.refresh_token,
                    token.resolve_expiry(Utc::now()),
                    Some(&client_id),
                );
                self.transition(&AuthMachineInput::TokenIssued)?;
                info!(client_id = %client_id, "Login successful");
                Ok(LoginOutcome::Authenticated(token))
            }
            Ok(GrantOutcome::Challenge(challenge)) => {
                store.set_pending_mfa(PendingMfaState {
                    mfa_token: challenge.mfa_token.clone(),
                    channel: challenge.channel.clone(),
                    email: challenge.email.clone(),
                    username,
                    rate_limit_reset_secs: challenge.rate_limit_reset_secs,
                    created_at: Utc::now(),
                });
                self.transition(&AuthMachineInput::ChallengeIssued)?;
                info!(
                    channel = %challenge.channel,
                    rate_limit_reset_secs = challenge.rate_limit_reset_secs,
                    "MFA challenge issued"
                );
                Ok(LoginOutcome::ChallengeIssued(challenge))
            }
            Err(err) => self.reject(err),
        }
    }

    /// Exchange the stored refresh token for new tokens.
    ///
    /// `client_id` overrides the id recorded at login.
    pub async fn refresh(
        &self,
        store: &mut ConfigStore,
        client_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> AuthResult<AuthToken> {
        let client = TokenClient::new(ClientOptions::from_provider(store.provider()))?;
        let refresh_token = store
            .provider()
            .refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or(AuthError::NotLoggedIn)?;
        let client_id = client_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| store.provider().oauth_client_id_or_default())
            .to_string();

        self.transition(&AuthMachineInput::SubmitRefresh)?;
        debug!(client_id = %client_id, "Refreshing token");

        let result = self
            .with_secret_recovery(store, &client_id, cancel, |secret| {
                let grant = RefreshGrant {
                    refresh_token: refresh_token.clone(),
                    client_secret: secret,
                    client_id: client_id.clone(),
                };
                let client = &client;
                async move { client.refresh_grant(&grant, cancel).await }
            })
            .await;

        match result {
            Ok(token) => {
                store.store_tokens(
                    &token.access_token,
                    &token.refresh_token,
                    token.resolve_expiry(Utc::now()),
                    Some(&client_id),
                );
                self.transition(&AuthMachineInput::TokenIssued)?;
                info!(client_id = %client_id, "Token refreshed successfully");
                Ok(token)
            }
            Err(err) => self.reject(err),
        }
    }

    /// Drop the stored session and reset the FSM.
    pub fn logout(&self, store: &mut ConfigStore) {
        store.clear_session();
        *self.fsm.lock().unwrap() = AuthMachine::new();
        info!("Logged out");
    }

    /// Run `attempt` with the resolved secret. On `invalid_client`, refetch
    /// the secret and run it exactly once more; a second rejection surfaces
    /// as a transport error.
    async fn with_secret_recovery<T, F, Fut>(
        &self,
        store: &mut ConfigStore,
        client_id: &str,
        cancel: &CancellationToken,
        attempt: F,
    ) -> AuthResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = AuthResult<T>>,
    {
        let resolved = self.resolver.resolve(store, client_id, cancel).await?;

        match attempt(resolved.secret).await {
            Err(AuthError::InvalidClient(failure)) => {
                warn!(
                    status = failure.status,
                    source = %resolved.source,
                    client_id = client_id,
                    "Client secret rejected, refetching"
                );
                self.transition(&AuthMachineInput::SecretRotated)?;

                let fresh = self.resolver.force_refetch(store, client_id, cancel).await?;
                attempt(fresh.secret)
                    .await
                    .map_err(AuthError::into_transport)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forkful_config_and_utils::Config;
    use remote_config_client::{
        RemoteConfigError, RemoteConfigResponse, RemoteConfigResult, RemoteSecretSource,
    };
    use std::sync::Arc;

    struct UnreachableRemote;

    #[async_trait]
    impl RemoteSecretSource for UnreachableRemote {
        async fn fetch_remote_config(
            &self,
            _cancel: &CancellationToken,
        ) -> RemoteConfigResult<RemoteConfigResponse> {
            Err(RemoteConfigError::MissingEntry("unreachable".into()))
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(SecretResolver::with_env_secret(
            Arc::new(UnreachableRemote),
            Some("s".into()),
        ))
    }

    fn request(otp: Option<OtpCode>) -> LoginRequest {
        LoginRequest {
            username: "u@example.com".into(),
            password: "p".into(),
            client_id: None,
            otp,
        }
    }

    #[test]
    fn test_initial_fsm_state() {
        assert_eq!(manager().fsm_state(), AuthState::Idle);
    }

    #[tokio::test]
    async fn test_missing_base_url_fails_before_network() {
        let manager = manager();
        let mut store = ConfigStore::in_memory(Config::new());
        store.provider_mut().base_url.clear();

        let err = manager
            .login(&mut store, &request(None), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
        assert_eq!(manager.fsm_state(), AuthState::Idle);
    }

    #[tokio::test]
    async fn test_otp_without_pending_challenge() {
        let manager = manager();
        let mut store = ConfigStore::in_memory(Config::new());
        let otp = OtpCode {
            method: "sms".into(),
            code: "123456".into(),
        };

        let err = manager
            .login(&mut store, &request(Some(otp)), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoPendingChallenge));
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let manager = manager();
        let mut store = ConfigStore::in_memory(Config::new());

        let err = manager
            .refresh(&mut store, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotLoggedIn));
        assert_eq!(manager.fsm_state(), AuthState::Idle);
    }

    #[tokio::test]
    async fn test_empty_password_is_rejected() {
        let manager = manager();
        let mut store = ConfigStore::in_memory(Config::new());
        let mut req = request(None);
        req.password.clear();

        let err = manager
            .login(&mut store, &req, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: password missing");
        assert_eq!(manager.fsm_state(), AuthState::Idle);
    }

    #[test]
    fn test_logout_clears_session() {
        let manager = manager();
        let mut store = ConfigStore::in_memory(Config::new());
        store.store_tokens("a", "r", None, Some("android"));

        manager.logout(&mut store);
        assert!(!store.provider().has_session());
        assert_eq!(manager.fsm_state(), AuthState::Idle);
    }
}

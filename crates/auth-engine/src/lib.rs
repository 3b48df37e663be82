//! Authentication against the delivery backend's OAuth token endpoint.
//!
//! This crate provides:
//! - A token endpoint client that speaks the mobile app's dialect (device
//!   headers, fixed scope, OTP headers on MFA resume)
//! - Client-secret resolution with config, environment, cache, and remote
//!   fetch precedence
//! - A session manager driving an explicit FSM through password, MFA resume,
//!   and refresh grants, including one-shot recovery from a rotated secret

mod auth_fsm;
mod error;
mod oauth;
mod secret_resolver;
mod session;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthState};
pub use error::{AuthError, AuthResult};
pub use oauth::{
    classify_failure, interpret_grant_response, parse_mfa_challenge, AuthToken, ClientOptions,
    GrantOutcome, MfaChallenge, OtpSubmission, PasswordGrant, RefreshGrant, TokenClient,
    DEFAULT_RATE_LIMIT_RESET_SECS, MFA_TRIGGERED_CODE, PASSWORD_SCOPE, RATE_LIMIT_RESET_HEADER,
};
pub use secret_resolver::{
    remote_config_key_candidates, ResolvedSecret, SecretResolver, SecretSource,
    CLIENT_SECRET_ENV,
};
pub use session::{LoginOutcome, LoginRequest, OtpCode, SessionManager};

//! Authentication commands.

use super::{prompt_line, read_password, Context, ScriptArgs};
use crate::output;
use crate::{BrowserLoginArgs, LoginArgs};
use anyhow::Result;
use auth_engine::{AuthToken, GrantOutcome, LoginOutcome, LoginRequest, MfaChallenge, OtpCode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use session_importer::BrowserLoginRequest;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// What a login attempt produced, for display.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LoginView {
    Authenticated {
        expires_at: Option<DateTime<Utc>>,
    },
    MfaRequired {
        channel: String,
        email: String,
        rate_limit_reset_secs: u64,
    },
}

impl LoginView {
    fn from_token(token: &AuthToken) -> Self {
        LoginView::Authenticated {
            expires_at: token.resolve_expiry(Utc::now()),
        }
    }

    fn from_challenge(challenge: &MfaChallenge) -> Self {
        LoginView::MfaRequired {
            channel: challenge.channel.clone(),
            email: challenge.email.clone(),
            rate_limit_reset_secs: challenge.rate_limit_reset_secs,
        }
    }
}

impl fmt::Display for LoginView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginView::Authenticated { expires_at } => {
                write!(f, "Logged in")?;
                if let Some(at) = expires_at {
                    write!(f, " (token expires {})", at.to_rfc3339())?;
                }
                Ok(())
            }
            LoginView::MfaRequired {
                channel,
                email,
                rate_limit_reset_secs,
            } => write!(
                f,
                "MFA required: a code was sent via {} to {}. Run 'forkful login --otp <CODE>' to continue (a new code can be requested in {}s).",
                channel, email, rate_limit_reset_secs
            ),
        }
    }
}

fn otp_code(code: Option<String>, method: Option<String>) -> Option<OtpCode> {
    code.map(|code| OtpCode {
        method: method.unwrap_or_default(),
        code,
    })
}

/// Login with email and password, or resume a pending MFA challenge.
pub async fn login(ctx: &mut Context, args: LoginArgs, cancel: &CancellationToken) -> Result<()> {
    let manager = ctx.session_manager()?;

    let resuming = args.otp.is_some();
    let email = match args.email {
        Some(email) => email,
        // A resume can reuse the username stored with the challenge
        None if resuming => String::new(),
        None => prompt_line("Email: ")?,
    };
    if email.is_empty() && !resuming {
        anyhow::bail!("Email is required");
    }
    let password = read_password(args.password_stdin)?;

    let mut request = LoginRequest {
        username: email,
        password,
        client_id: args.client_id,
        otp: otp_code(args.otp, args.otp_method.clone()),
    };

    let mut outcome = manager.login(&mut ctx.store, &request, cancel).await?;

    if args.wait_for_otp {
        while let LoginOutcome::ChallengeIssued(challenge) = &outcome {
            output::print(&LoginView::from_challenge(challenge), &ctx.format);
            let code = prompt_line("OTP: ")?;
            if code.is_empty() {
                anyhow::bail!("OTP is required");
            }
            request.otp = otp_code(Some(code), args.otp_method.clone());
            outcome = manager.login(&mut ctx.store, &request, cancel).await?;
        }
    }

    let view = match &outcome {
        LoginOutcome::Authenticated(token) => LoginView::from_token(token),
        LoginOutcome::ChallengeIssued(challenge) => LoginView::from_challenge(challenge),
    };
    output::print(&view, &ctx.format);
    Ok(())
}

/// Login through a browser automation script.
pub async fn login_browser(
    ctx: &mut Context,
    args: BrowserLoginArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let client_id = args
        .client_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| ctx.store.provider().oauth_client_id_or_default().to_string());

    let resolver = ctx.secret_resolver()?;
    let password = read_password(args.password_stdin)?;

    let browser = ctx.browser(&ScriptArgs {
        script: args.script.clone(),
        program: args.program,
        timeout_secs: args.timeout_secs,
        project: None,
    });
    let request = BrowserLoginRequest {
        username: args.email,
        password,
        client_id,
        otp: otp_code(args.otp, args.otp_method),
    };

    let login = browser
        .password_grant(&args.script, &mut ctx.store, &resolver, &request, cancel)
        .await?;

    let view = match &login.outcome {
        GrantOutcome::Token(token) => LoginView::from_token(token),
        GrantOutcome::Challenge(challenge) => LoginView::from_challenge(challenge),
    };
    output::print(&view, &ctx.format);
    Ok(())
}

/// Refresh the access token.
pub async fn refresh(
    ctx: &mut Context,
    client_id: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let manager = ctx.session_manager()?;
    let token = manager.refresh(&mut ctx.store, client_id, cancel).await?;
    output::print(&LoginView::from_token(&token), &ctx.format);
    Ok(())
}

#[derive(Serialize)]
struct StatusView {
    logged_in: bool,
    likely_expired: bool,
    expires_at: Option<DateTime<Utc>>,
    client_id: String,
    base_url: String,
    country: String,
    mfa_pending: bool,
    mfa_channel: Option<String>,
    has_cookies: bool,
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = match (self.logged_in, self.likely_expired) {
            (false, _) => "not logged in",
            (true, true) => "logged in (token likely expired)",
            (true, false) => "logged in",
        };
        writeln!(f, "Auth:       {}", auth)?;
        writeln!(
            f,
            "Expires:    {}",
            self.expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        )?;
        writeln!(f, "Client ID:  {}", self.client_id)?;
        writeln!(f, "Base URL:   {} ({})", self.base_url, self.country)?;
        writeln!(f, "Cookies:    {}", if self.has_cookies { "stored" } else { "none" })?;
        match &self.mfa_channel {
            Some(channel) if self.mfa_pending => write!(f, "MFA:        pending via {}", channel),
            _ => write!(f, "MFA:        none pending"),
        }
    }
}

/// Check authentication status. Purely local; no network calls.
pub fn status(ctx: &Context) -> Result<()> {
    let provider = ctx.store.provider();
    let view = StatusView {
        logged_in: provider.has_session(),
        likely_expired: provider.token_likely_expired(Utc::now()),
        expires_at: provider.access_token_expires_at(),
        client_id: provider.oauth_client_id_or_default().to_string(),
        base_url: provider.base_url.clone(),
        country: provider.target_country_iso.clone(),
        mfa_pending: provider.pending_mfa.is_some(),
        mfa_channel: provider.pending_mfa.as_ref().map(|p| p.channel.clone()),
        has_cookies: provider.cookie_header().is_some(),
    };
    output::print(&view, &ctx.format);
    Ok(())
}

/// Logout and clear session.
pub fn logout(ctx: &mut Context) -> Result<()> {
    let manager = ctx.session_manager()?;
    manager.logout(&mut ctx.store);
    output::print_success("Logged out successfully", &ctx.format);
    Ok(())
}

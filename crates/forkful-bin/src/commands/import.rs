//! Cookie and session import commands.

use super::{Context, ScriptArgs};
use crate::output;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use session_importer::{ImportedSession, SessionImporter};
use std::fmt;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct ImportView {
    host: String,
    cookie_count: usize,
    has_token: bool,
    expires_at: Option<DateTime<Utc>>,
    client_id: Option<String>,
}

impl From<&ImportedSession> for ImportView {
    fn from(imported: &ImportedSession) -> Self {
        Self {
            host: imported.session.host.clone(),
            cookie_count: imported.cookie_count,
            has_token: imported.has_token(),
            expires_at: imported.expires_at,
            client_id: imported.client_id.clone(),
        }
    }
}

impl fmt::Display for ImportView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Imported {} cookie(s) for {}", self.cookie_count, self.host)?;
        if self.has_token {
            write!(f, " with access token")?;
            if let Some(at) = self.expires_at {
                write!(f, " (expires {})", at.to_rfc3339())?;
            }
        }
        Ok(())
    }
}

fn import_and_apply(
    ctx: &mut Context,
    cookie_header: Option<&str>,
    bearer: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    let base_url = ctx.store.provider().base_url.clone();
    let imported = SessionImporter::import(&base_url, cookie_header, bearer, user_agent)?;
    imported.apply(&mut ctx.store);
    output::print(&ImportView::from(&imported), &ctx.format);
    Ok(())
}

/// Store a cookie header copied from a browser.
pub fn cookies_import(ctx: &mut Context, header: &str, user_agent: Option<&str>) -> Result<()> {
    import_and_apply(ctx, Some(header), None, user_agent)
}

/// Read cookies from a local browser profile and store them.
pub async fn cookies_chrome(
    ctx: &mut Context,
    script: ScriptArgs,
    url: Option<&str>,
    profile: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let target_url = url
        .map(str::to_string)
        .unwrap_or_else(|| ctx.store.provider().base_url.clone());

    let browser = ctx.browser(&script);
    let extraction = browser
        .extract_cookies(&script.script, &target_url, profile, cancel)
        .await?;

    import_and_apply(ctx, Some(&extraction.cookie_header), None, None)
}

/// Import cookies and/or a bearer token as the current session.
pub fn session_import(
    ctx: &mut Context,
    cookie_header: Option<&str>,
    bearer: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    import_and_apply(ctx, cookie_header, bearer, user_agent)
}

//! Configuration commands.

use super::Context;
use crate::output::{self, mask, OutputFormat};
use crate::ConfigSetArgs;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct ConfigView {
    path: Option<String>,
    base_url: String,
    country: String,
    device_id: String,
    client_id: String,
    client_secret: Option<String>,
    client_secret_client_id: Option<String>,
    cached_client_secrets: BTreeMap<String, CachedSecretView>,
    remote_config_aliases: BTreeMap<String, Vec<String>>,
    user_agent: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    cookie_hosts: Vec<String>,
}

#[derive(Serialize)]
struct CachedSecretView {
    secret: String,
    fetched_at: DateTime<Utc>,
}

/// Show configuration with secrets and tokens masked.
pub fn config_show(ctx: &Context) -> Result<()> {
    let provider = ctx.store.provider();
    let view = ConfigView {
        path: ctx.store.path().map(|p| p.display().to_string()),
        base_url: provider.base_url.clone(),
        country: provider.target_country_iso.clone(),
        device_id: provider.device_id.clone(),
        client_id: provider.oauth_client_id_or_default().to_string(),
        client_secret: provider.client_secret.as_deref().map(mask),
        client_secret_client_id: provider.client_secret_client_id.clone(),
        cached_client_secrets: provider
            .cached_client_secrets
            .iter()
            .map(|(id, cached)| {
                (
                    id.clone(),
                    CachedSecretView {
                        secret: mask(&cached.secret),
                        fetched_at: cached.fetched_at,
                    },
                )
            })
            .collect(),
        remote_config_aliases: provider.remote_config_aliases.clone(),
        user_agent: provider.http_user_agent.clone(),
        access_token: provider.access_token.as_deref().map(mask),
        refresh_token: provider.refresh_token.as_deref().map(mask),
        expires_at: provider.expires_at,
        cookie_hosts: provider.cookies_by_host.keys().cloned().collect(),
    };

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Text => {
            output::print_heading("Configuration");
            output::print_opt_row("File", view.path.as_deref());
            output::print_row("Base URL", &view.base_url);
            output::print_row("Country", &view.country);
            output::print_row("Device ID", &view.device_id);
            output::print_row("Client ID", &view.client_id);
            let secret = view.client_secret.as_deref().map(|secret| {
                match &view.client_secret_client_id {
                    Some(owner) => format!("{} (for {})", secret, owner),
                    None => secret.to_string(),
                }
            });
            output::print_opt_row("Client secret", secret.as_deref());
            for (id, cached) in &view.cached_client_secrets {
                output::print_row(
                    &format!("Cached secret {}", id),
                    &format!("{} (fetched {})", cached.secret, cached.fetched_at.to_rfc3339()),
                );
            }
            for (country, aliases) in &view.remote_config_aliases {
                output::print_row(&format!("Aliases {}", country), &aliases.join(", "));
            }
            output::print_opt_row("User agent", view.user_agent.as_deref());
            output::print_opt_row("Access token", view.access_token.as_deref());
            output::print_opt_row("Refresh token", view.refresh_token.as_deref());
            let expires = view.expires_at.map(|t| t.to_rfc3339());
            output::print_opt_row("Expires", expires.as_deref());
            output::print_row("Cookie hosts", &view.cookie_hosts.join(", "));
        }
    }
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Set configuration values.
pub fn config_set(ctx: &mut Context, args: ConfigSetArgs) -> Result<()> {
    let mut changed = Vec::new();

    if let Some(base_url) = args.base_url {
        url::Url::parse(base_url.trim())
            .map_err(|e| anyhow::anyhow!("Invalid base URL: {}", e))?;
        ctx.store.provider_mut().base_url = base_url.trim().to_string();
        changed.push("base_url");
    }
    if let Some(country) = args.country {
        let country = country.trim().to_ascii_uppercase();
        if country.is_empty() {
            anyhow::bail!("Country is required");
        }
        ctx.store.provider_mut().target_country_iso = country;
        changed.push("target_country_iso");
    }
    if let Some(device_id) = args.device_id.and_then(non_empty) {
        ctx.store.provider_mut().device_id = device_id;
        changed.push("device_id");
    }
    let client_id = args.client_id.map(non_empty);
    if let Some(secret) = args.client_secret {
        // The secret belongs to the client id named with it, else the current one
        let owner = match &client_id {
            Some(id) => id.clone(),
            None => ctx.store.provider().oauth_client_id.clone(),
        };
        let provider = ctx.store.provider_mut();
        provider.client_secret = non_empty(secret);
        provider.client_secret_client_id = provider.client_secret.as_ref().and(owner);
        changed.push("client_secret");
    }
    if let Some(client_id) = client_id {
        ctx.store.provider_mut().oauth_client_id = client_id;
        changed.push("oauth_client_id");
    }
    if let Some(user_agent) = args.user_agent {
        ctx.store.provider_mut().http_user_agent = non_empty(user_agent);
        changed.push("http_user_agent");
    }

    if changed.is_empty() {
        anyhow::bail!("Nothing to set");
    }
    output::print_success(&format!("Updated {}", changed.join(", ")), &ctx.format);
    Ok(())
}

//! Client secret command.

use super::Context;
use crate::output::{self, mask};
use anyhow::Result;
use auth_engine::SecretSource;
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct SecretView {
    client_id: String,
    source: SecretSource,
    secret: String,
}

impl fmt::Display for SecretView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Client secret for '{}' from {}: {}",
            self.client_id, self.source, self.secret
        )
    }
}

/// Resolve (or refetch) the client secret and show where it came from.
pub async fn secret(
    ctx: &mut Context,
    refetch: bool,
    client_id: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let client_id = client_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ctx.store.provider().oauth_client_id_or_default())
        .to_string();

    let resolver = ctx.secret_resolver()?;
    let resolved = if refetch {
        resolver.force_refetch(&mut ctx.store, &client_id, cancel).await?
    } else {
        resolver.resolve(&mut ctx.store, &client_id, cancel).await?
    };

    let view = SecretView {
        client_id,
        source: resolved.source,
        secret: mask(&resolved.secret),
    };
    output::print(&view, &ctx.format);
    Ok(())
}

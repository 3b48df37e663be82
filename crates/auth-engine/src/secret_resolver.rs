//! Client-secret resolution.
//!
//! Precedence, first non-empty hit wins:
//! 1. explicit `client_secret` in config, when it belongs to the client id
//! 2. the `FOODORA_CLIENT_SECRET` environment variable
//! 3. a secret cached from an earlier remote fetch for the same client id
//! 4. a live remote-config fetch, which is then cached

use crate::{AuthError, AuthResult};
use chrono::Utc;
use forkful_config_and_utils::{ConfigStore, ProviderConfig};
use remote_config_client::{ClientSecretTable, RemoteSecretSource};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Environment variable overriding the client secret.
pub const CLIENT_SECRET_ENV: &str = "FOODORA_CLIENT_SECRET";

/// Where a resolved secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    Config,
    Environment,
    Cache,
    RemoteFetch,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SecretSource::Config => "config",
            SecretSource::Environment => "environment",
            SecretSource::Cache => "cache",
            SecretSource::RemoteFetch => "remote_fetch",
        };
        f.write_str(name)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub secret: String,
    pub source: SecretSource,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("secret", &"[redacted]")
            .field("source", &self.source)
            .finish()
    }
}

/// Remote-config keys to try for the configured market, in order.
///
/// Country code first, then its configured aliases, then the first label of
/// the API host. Upper-cased, de-duplicated, empties skipped.
pub fn remote_config_key_candidates(provider: &ProviderConfig) -> Vec<String> {
    let country = provider.target_country_iso.trim().to_ascii_uppercase();

    let aliases = provider
        .remote_config_aliases
        .iter()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(&country))
        .map(|(_, aliases)| aliases.clone())
        .unwrap_or_default();

    let host_label = Url::parse(&provider.base_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .and_then(|host| host.split('.').next().map(str::to_string))
        .unwrap_or_default();

    let mut candidates: Vec<String> = Vec::new();
    for key in std::iter::once(country)
        .chain(aliases)
        .chain(std::iter::once(host_label))
    {
        let key = key.trim().to_ascii_uppercase();
        if !key.is_empty() && !candidates.contains(&key) {
            candidates.push(key);
        }
    }
    candidates
}

pub struct SecretResolver {
    remote: Arc<dyn RemoteSecretSource>,
    env_secret: Option<String>,
}

impl SecretResolver {
    /// Reads the environment override once, at construction.
    pub fn new(remote: Arc<dyn RemoteSecretSource>) -> Self {
        let env_secret = std::env::var(CLIENT_SECRET_ENV).ok();
        Self::with_env_secret(remote, env_secret)
    }

    pub fn with_env_secret(remote: Arc<dyn RemoteSecretSource>, env_secret: Option<String>) -> Self {
        Self {
            remote,
            env_secret: env_secret
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    pub async fn resolve(
        &self,
        store: &mut ConfigStore,
        client_id: &str,
        cancel: &CancellationToken,
    ) -> AuthResult<ResolvedSecret> {
        let provider = store.provider();

        if let Some(secret) = provider.explicit_client_secret(client_id) {
            return Ok(self.hit(secret, SecretSource::Config, client_id));
        }

        if let Some(secret) = self.env_secret.as_deref() {
            return Ok(self.hit(secret, SecretSource::Environment, client_id));
        }

        if let Some(cached) = provider
            .cached_client_secrets
            .get(client_id)
            .filter(|c| !c.secret.trim().is_empty())
        {
            return Ok(self.hit(&cached.secret, SecretSource::Cache, client_id));
        }

        self.fetch(store, client_id, cancel).await
    }

    /// Skip every local source and fetch anew, overwriting the cache.
    ///
    /// Used after the token endpoint rejects the current secret.
    pub async fn force_refetch(
        &self,
        store: &mut ConfigStore,
        client_id: &str,
        cancel: &CancellationToken,
    ) -> AuthResult<ResolvedSecret> {
        self.fetch(store, client_id, cancel).await
    }

    fn hit(&self, secret: &str, source: SecretSource, client_id: &str) -> ResolvedSecret {
        debug!(source = %source, client_id = client_id, "Client secret resolved");
        ResolvedSecret {
            secret: secret.to_string(),
            source,
        }
    }

    async fn fetch(
        &self,
        store: &mut ConfigStore,
        client_id: &str,
        cancel: &CancellationToken,
    ) -> AuthResult<ResolvedSecret> {
        let candidates = remote_config_key_candidates(store.provider());
        debug!(client_id = client_id, candidates = ?candidates, "Fetching client secret from remote config");

        let response = self.remote.fetch_remote_config(cancel).await?;
        let table = ClientSecretTable::from_response(&response)?;

        let (market, secret) = table.lookup(&candidates, client_id).ok_or_else(|| {
            AuthError::SecretUnavailable(format!(
                "no secret for client id '{}' under keys {}",
                client_id,
                candidates.join(", ")
            ))
        })?;

        info!(
            market = market,
            client_id = client_id,
            template_version = %response.template_version,
            "Fetched client secret from remote config"
        );

        let secret = secret.to_string();
        store.cache_client_secret(client_id, &secret, Utc::now());
        Ok(ResolvedSecret {
            secret,
            source: SecretSource::RemoteFetch,
        })
    }
}

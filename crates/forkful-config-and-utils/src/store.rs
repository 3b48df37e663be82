//! Configuration store with explicit dirty tracking.
//!
//! One `ConfigStore` is created per CLI invocation and passed by `&mut` into
//! every component that reads or writes persisted state. Each mutation marks
//! the store dirty; the caller flushes once with [`ConfigStore::save`].

use crate::config::{CachedSecret, Config, PendingMfaState, ProviderConfig};
use crate::{CoreError, CoreResult, Paths};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: Config,
    dirty: bool,
}

impl ConfigStore {
    /// Load from the default config file, creating defaults if it does not exist.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        Self::load_from_file(paths.config_file())
    }

    /// Load from a specific file. A missing file yields a fresh, dirty store.
    pub fn load_from_file(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();

        let (config, migrated) = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Config::from_json_str(&content)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            (Config::new(), false)
        };

        if migrated {
            info!(path = %path.display(), "Migrated legacy config format");
        }

        let mut store = Self {
            path: Some(path),
            config,
            dirty: migrated,
        };
        store.ensure_device_id();
        store.pin_client_secret_owner();
        Ok(store)
    }

    /// A store that is never written to disk.
    pub fn in_memory(config: Config) -> Self {
        let mut store = Self {
            path: None,
            config,
            dirty: false,
        };
        store.ensure_device_id();
        store.pin_client_secret_owner();
        store
    }

    fn ensure_device_id(&mut self) {
        if self.config.providers.foodora.device_id.trim().is_empty() {
            self.config.providers.foodora.device_id = uuid::Uuid::new_v4().to_string();
            self.dirty = true;
        }
    }

    fn pin_client_secret_owner(&mut self) {
        if self.config.providers.foodora.pin_client_secret_owner() {
            self.dirty = true;
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.config.providers.foodora
    }

    /// Mutable access to the provider block. Marks the store dirty.
    pub fn provider_mut(&mut self) -> &mut ProviderConfig {
        self.dirty = true;
        &mut self.config.providers.foodora
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Write the config if anything changed. Returns whether a write happened.
    pub fn save(&mut self) -> CoreResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| CoreError::Config("in-memory config cannot be saved".to_string()))?;

        write_private(path, &serde_json::to_string_pretty(&self.config)?)?;
        self.dirty = false;
        debug!(path = %path.display(), "Config saved");
        Ok(true)
    }

    pub fn set_pending_mfa(&mut self, state: PendingMfaState) {
        self.provider_mut().pending_mfa = Some(state);
    }

    /// Remove and return the pending challenge. Only marks dirty if one existed.
    pub fn take_pending_mfa(&mut self) -> Option<PendingMfaState> {
        let pending = self.config.providers.foodora.pending_mfa.take();
        if pending.is_some() {
            self.dirty = true;
        }
        pending
    }

    pub fn store_tokens(
        &mut self,
        access_token: &str,
        refresh_token: &str,
        expires_at: Option<DateTime<Utc>>,
        client_id: Option<&str>,
    ) {
        let provider = self.provider_mut();
        provider.access_token = Some(access_token.to_string());
        if !refresh_token.is_empty() {
            provider.refresh_token = Some(refresh_token.to_string());
        }
        provider.expires_at = expires_at;
        if let Some(id) = client_id.filter(|id| !id.is_empty()) {
            provider.oauth_client_id = Some(id.to_string());
        }
    }

    /// Drop tokens, pending MFA, and cookies for the API host.
    pub fn clear_session(&mut self) {
        let host = self.provider().cookie_host();
        let provider = self.provider_mut();
        provider.access_token = None;
        provider.refresh_token = None;
        provider.expires_at = None;
        provider.pending_mfa = None;
        provider.cookies_by_host.remove(&host);
    }

    pub fn cache_client_secret(&mut self, client_id: &str, secret: &str, fetched_at: DateTime<Utc>) {
        let provider = self.provider_mut();
        provider.cached_client_secrets.insert(
            client_id.to_string(),
            CachedSecret {
                secret: secret.to_string(),
                fetched_at,
            },
        );
        provider.oauth_client_id = Some(client_id.to_string());
    }

    pub fn set_cookie_header(&mut self, host: &str, header: &str) {
        self.provider_mut()
            .cookies_by_host
            .insert(host.to_string(), header.to_string());
    }
}

/// Write `content` to `path` readable only by the owner, via a temp file and rename.
fn write_private(path: &Path, content: &str) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("json.tmp");
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)?;
    Ok(())
}

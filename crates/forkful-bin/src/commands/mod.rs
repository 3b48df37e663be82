//! CLI command implementations.

mod auth;
mod config;
mod import;
mod secret;

pub use auth::{login, login_browser, logout, refresh, status};
pub use config::{config_set, config_show};
pub use import::{cookies_chrome, cookies_import, session_import};
pub use secret::secret;

use crate::output::OutputFormat;
use anyhow::Result;
use async_trait::async_trait;
use auth_engine::{SecretResolver, SessionManager};
use forkful_config_and_utils::{ConfigStore, Paths};
use remote_config_client::{
    RemoteConfigClient, RemoteConfigError, RemoteConfigResponse, RemoteConfigResult,
    RemoteSecretSource,
};
use session_importer::{BrowserAutomation, NpmProject, ScriptCollaborator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State shared by every command of one invocation.
pub struct Context {
    pub paths: Paths,
    pub store: ConfigStore,
    pub format: OutputFormat,
}

impl Context {
    pub fn load(config_path: Option<&Path>, format: OutputFormat) -> Result<Self> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        let store = match config_path {
            Some(path) => ConfigStore::load_from_file(path)?,
            None => ConfigStore::load(&paths)?,
        };
        Ok(Self {
            paths,
            store,
            format,
        })
    }

    /// Write the config if any command changed it.
    pub fn flush(&mut self) -> Result<()> {
        match self.store.save() {
            Ok(true) => {
                debug!("Config flushed");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to save config");
                Err(e.into())
            }
        }
    }

    pub fn secret_resolver(&self) -> Result<SecretResolver> {
        let firebase = self.store.provider().market().firebase;
        let remote: Arc<dyn RemoteSecretSource> = match RemoteConfigClient::new(firebase) {
            Ok(client) => Arc::new(client),
            Err(RemoteConfigError::IncompleteIdentity(missing)) => {
                debug!(missing = %missing, "Remote config disabled");
                Arc::new(MissingIdentity { missing })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(SecretResolver::new(remote))
    }

    pub fn session_manager(&self) -> Result<SessionManager> {
        Ok(SessionManager::new(self.secret_resolver()?))
    }

    pub fn browser(&self, script: &ScriptArgs) -> BrowserAutomation {
        let browser = BrowserAutomation::new(
            Arc::new(ScriptCollaborator),
            self.paths.collaborators_dir(),
        )
        .with_program(script.program.clone())
        .with_timeout(Duration::from_secs(script.timeout_secs));
        match &script.project {
            Some(project) => browser.with_project(project.clone()),
            None => browser,
        }
    }
}

/// How to run a collaborator script.
pub struct ScriptArgs {
    pub script: PathBuf,
    pub program: String,
    pub timeout_secs: u64,
    /// npm dependencies installed next to the script first.
    pub project: Option<NpmProject>,
}

/// Stands in for the remote-config client when the binary was built without
/// a Firebase identity. Local secret sources keep working; a fetch fails.
struct MissingIdentity {
    missing: String,
}

#[async_trait]
impl RemoteSecretSource for MissingIdentity {
    async fn fetch_remote_config(
        &self,
        _cancel: &CancellationToken,
    ) -> RemoteConfigResult<RemoteConfigResponse> {
        Err(RemoteConfigError::IncompleteIdentity(self.missing.clone()))
    }
}

/// Read the password from stdin or prompt for it without echo.
fn read_password(from_stdin: bool) -> Result<String> {
    let password = if from_stdin {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else {
        rpassword::prompt_password("Password: ")?
    };

    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    Ok(password)
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::{self, Write};

    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

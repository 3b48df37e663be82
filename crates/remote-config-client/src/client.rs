use crate::{RemoteConfigError, RemoteConfigResult, RemoteSecretSource};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flexible_scalars::FlexibleString;
use forkful_config_and_utils::{summarize_response_body, until_cancelled, FirebaseApp, HttpFailure};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const INSTALLATIONS_BASE_URL: &str = "https://firebaseinstallations.googleapis.com";
pub const REMOTE_CONFIG_BASE_URL: &str = "https://firebaseremoteconfig.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FIS_SDK_VERSION: &str = "a:17.2.0";
const RC_SDK_VERSION: &str = "21.6.0";

/// A registered installation.
#[derive(Debug, Clone)]
pub struct Installation {
    pub fid: String,
    pub auth_token: String,
}

/// Decoded remote-config template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfigResponse {
    pub state: String,
    pub template_version: String,
    pub entries: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallRequest<'a> {
    fid: &'a str,
    app_id: &'a str,
    auth_version: &'a str,
    sdk_version: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallResponse {
    #[serde(default)]
    fid: FlexibleString,
    #[serde(default)]
    auth_token: InstallAuthToken,
}

#[derive(Default, Deserialize)]
struct InstallAuthToken {
    #[serde(default)]
    token: FlexibleString,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchRequest<'a> {
    app_instance_id: &'a str,
    app_instance_id_token: &'a str,
    app_id: &'a str,
    package_name: &'a str,
    sdk_version: &'a str,
    analytics_user_properties: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchResponse {
    #[serde(default)]
    state: FlexibleString,
    #[serde(default)]
    template_version: FlexibleString,
    #[serde(default)]
    entries: BTreeMap<String, FlexibleString>,
}

/// Generate a Firebase installation id: 16 random bytes, base64url, no padding.
///
/// The top nibble of the first byte is fixed to `0111` as Firebase requires,
/// which also guarantees the id starts with a letter.
pub fn new_fid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    bytes[0] = 0b0111_0000 | (bytes[0] & 0b0000_1111);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Performs the installation + fetch handshake for one Firebase app.
#[derive(Clone)]
pub struct RemoteConfigClient {
    http_client: Client,
    app: FirebaseApp,
    installations_base: String,
    remote_config_base: String,
}

impl RemoteConfigClient {
    /// Create a client against the public Firebase endpoints.
    pub fn new(app: FirebaseApp) -> RemoteConfigResult<Self> {
        Self::with_base_urls(app, INSTALLATIONS_BASE_URL, REMOTE_CONFIG_BASE_URL)
    }

    /// Create a client against custom endpoints.
    pub fn with_base_urls(
        app: FirebaseApp,
        installations_base: &str,
        remote_config_base: &str,
    ) -> RemoteConfigResult<Self> {
        let missing = app.missing_fields();
        if !missing.is_empty() {
            return Err(RemoteConfigError::IncompleteIdentity(missing.join(", ")));
        }

        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            app,
            installations_base: installations_base.trim_end_matches('/').to_string(),
            remote_config_base: remote_config_base.trim_end_matches('/').to_string(),
        })
    }

    /// Register a new installation.
    pub async fn install(&self) -> RemoteConfigResult<Installation> {
        let url = format!(
            "{}/v1/projects/{}/installations",
            self.installations_base, self.app.project_id
        );
        let fid = new_fid();

        debug!(url = %url, "Registering Firebase installation");

        let response = self
            .http_client
            .post(&url)
            .header("X-Android-Package", &self.app.package_name)
            .header("X-Android-Cert", &self.app.cert_sha1)
            .header("x-goog-api-key", &self.app.api_key)
            .json(&InstallRequest {
                fid: &fid,
                app_id: &self.app.app_id,
                auth_version: "FIS_v2",
                sdk_version: FIS_SDK_VERSION,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, body_summary = %summarize_response_body(&body), "Firebase installation failed");
            return Err(RemoteConfigError::Status(HttpFailure::new(
                "POST",
                url,
                status.as_u16(),
                body,
            )));
        }

        let data: InstallResponse = serde_json::from_str(&body)?;
        let fid = if data.fid.is_empty() {
            fid
        } else {
            data.fid.into_inner()
        };

        Ok(Installation {
            fid,
            auth_token: data.auth_token.token.into_inner(),
        })
    }

    /// Fetch the remote-config template using a registered installation.
    pub async fn fetch_with(&self, installation: &Installation) -> RemoteConfigResult<RemoteConfigResponse> {
        let url = format!(
            "{}/v1/projects/{}/namespaces/firebase:fetch",
            self.remote_config_base, self.app.project_number
        );

        debug!(url = %url, "Fetching Firebase remote config");

        let response = self
            .http_client
            .post(&url)
            .header("X-Android-Package", &self.app.package_name)
            .header("X-Android-Cert", &self.app.cert_sha1)
            .header("X-Goog-Api-Key", &self.app.api_key)
            .header("X-Goog-Firebase-Installations-Id", &installation.fid)
            .header("X-Goog-Firebase-Installations-Auth", &installation.auth_token)
            .json(&FetchRequest {
                app_instance_id: &installation.fid,
                app_instance_id_token: &installation.auth_token,
                app_id: &self.app.app_id,
                package_name: &self.app.package_name,
                sdk_version: RC_SDK_VERSION,
                analytics_user_properties: BTreeMap::new(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, body_summary = %summarize_response_body(&body), "Firebase remote config fetch failed");
            return Err(RemoteConfigError::Status(HttpFailure::new(
                "POST",
                url,
                status.as_u16(),
                body,
            )));
        }

        let data: FetchResponse = serde_json::from_str(&body)?;
        let response = RemoteConfigResponse {
            state: data.state.into_inner(),
            template_version: data.template_version.into_inner(),
            entries: data
                .entries
                .into_iter()
                .map(|(k, v)| (k, v.into_inner()))
                .collect(),
        };

        info!(
            state = %response.state,
            template_version = %response.template_version,
            entries = response.entries.len(),
            "Fetched Firebase remote config"
        );

        Ok(response)
    }

    /// Install, then fetch. Exactly one call to each endpoint.
    pub async fn fetch(&self, cancel: &CancellationToken) -> RemoteConfigResult<RemoteConfigResponse> {
        until_cancelled(cancel, async {
            let installation = self.install().await?;
            self.fetch_with(&installation).await
        })
        .await
        .ok_or(RemoteConfigError::Cancelled)?
    }
}

#[async_trait]
impl RemoteSecretSource for RemoteConfigClient {
    async fn fetch_remote_config(
        &self,
        cancel: &CancellationToken,
    ) -> RemoteConfigResult<RemoteConfigResponse> {
        self.fetch(cancel).await
    }
}

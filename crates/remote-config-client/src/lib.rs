//! Firebase remote-config emulation.
//!
//! The delivery backend's OAuth client secret is not shipped in its app; the
//! app downloads it from Firebase Remote Config after registering itself as
//! an installation. This crate performs the same two calls:
//!
//! 1. `POST .../installations` with a fresh random FID to obtain an
//!    installation auth token.
//! 2. `POST .../namespaces/firebase:fetch` presenting that token, returning
//!    the template entries.
//!
//! Every fetch registers a new installation. Callers that want reuse should
//! cache the secret they extract, not the installation.

mod client;
mod error;
mod secrets;

pub use client::{
    new_fid, Installation, RemoteConfigClient, RemoteConfigResponse, INSTALLATIONS_BASE_URL,
    REMOTE_CONFIG_BASE_URL,
};
pub use error::{RemoteConfigError, RemoteConfigResult};
pub use secrets::{ClientSecretTable, CLIENT_SECRETS_ENTRY};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Anything that can produce a remote-config template.
///
/// [`RemoteConfigClient`] is the production implementation; tests substitute
/// fakes that count invocations.
#[async_trait]
pub trait RemoteSecretSource: Send + Sync {
    async fn fetch_remote_config(
        &self,
        cancel: &CancellationToken,
    ) -> RemoteConfigResult<RemoteConfigResponse>;
}

//! Configuration, paths, logging, and shared helpers for forkful.

mod cancel;
mod config;
mod error;
mod http_failure;
pub mod jwt;
mod logging;
mod market;
mod paths;
mod store;

pub use cancel::until_cancelled;
pub use config::{
    CachedSecret, Config, PendingMfaState, ProviderConfig, Providers, CONFIG_VERSION,
    DEFAULT_BASE_URL, DEFAULT_COUNTRY_ISO,
};
pub use error::{CoreError, CoreResult};
pub use http_failure::{summarize_response_body, HttpFailure, MAX_ERROR_BODY_CHARS};
pub use logging::{init_logging, parse_level};
pub use market::{AppHeaders, FirebaseApp, MarketProfile, DEFAULT_OAUTH_CLIENT_ID};
pub use paths::Paths;
pub use store::ConfigStore;

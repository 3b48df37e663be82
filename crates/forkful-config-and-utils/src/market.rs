//! Per-market app identity.
//!
//! The backend only talks to its own mobile apps, so every request has to
//! carry the headers the matching app would send.

use serde::Serialize;

/// OAuth client id used when neither the caller nor the config names one.
pub const DEFAULT_OAUTH_CLIENT_ID: &str = "android";

/// User agent of the Android app build these headers were captured from.
const DEFAULT_USER_AGENT: &str = "Android-app-25.3.0(250300134)";

/// App name sent by markets without a dedicated app.
const GENERIC_APP_NAME: &str = "com.global.foodpanda.android";

/// Firebase app identity (can be overridden at compile time via FORKFUL_FIREBASE_* env vars).
const FIREBASE_PACKAGE: &str = match option_env!("FORKFUL_FIREBASE_PACKAGE") {
    Some(v) => v,
    None => "com.mjam.mjam",
};
const FIREBASE_CERT_SHA1: &str = match option_env!("FORKFUL_FIREBASE_CERT_SHA1") {
    Some(v) => v,
    None => "",
};
const FIREBASE_API_KEY: &str = match option_env!("FORKFUL_FIREBASE_API_KEY") {
    Some(v) => v,
    None => "",
};
const FIREBASE_PROJECT_ID: &str = match option_env!("FORKFUL_FIREBASE_PROJECT_ID") {
    Some(v) => v,
    None => "",
};
const FIREBASE_PROJECT_NUMBER: &str = match option_env!("FORKFUL_FIREBASE_PROJECT_NUMBER") {
    Some(v) => v,
    None => "",
};
const FIREBASE_APP_ID: &str = match option_env!("FORKFUL_FIREBASE_APP_ID") {
    Some(v) => v,
    None => "",
};

/// Headers identifying the calling app to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppHeaders {
    pub app_name: String,
    pub fp_api_key: String,
    pub user_agent: String,
}

/// Identity presented during the Firebase installation handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseApp {
    pub package_name: String,
    pub cert_sha1: String,
    pub api_key: String,
    pub project_id: String,
    pub project_number: String,
    pub app_id: String,
}

impl FirebaseApp {
    /// Names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("package_name", &self.package_name),
            ("cert_sha1", &self.cert_sha1),
            ("api_key", &self.api_key),
            ("project_id", &self.project_id),
            ("project_number", &self.project_number),
            ("app_id", &self.app_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

impl Default for FirebaseApp {
    fn default() -> Self {
        Self {
            package_name: FIREBASE_PACKAGE.to_string(),
            cert_sha1: FIREBASE_CERT_SHA1.to_string(),
            api_key: FIREBASE_API_KEY.to_string(),
            project_id: FIREBASE_PROJECT_ID.to_string(),
            project_number: FIREBASE_PROJECT_NUMBER.to_string(),
            app_id: FIREBASE_APP_ID.to_string(),
        }
    }
}

/// Everything market-specific about how we present ourselves.
#[derive(Debug, Clone)]
pub struct MarketProfile {
    pub country: String,
    pub app_headers: AppHeaders,
    pub firebase: FirebaseApp,
}

impl MarketProfile {
    pub fn for_country(iso: &str) -> Self {
        let country = iso.trim().to_ascii_uppercase();
        let app_name = match country.as_str() {
            "AT" => "at.mjam",
            _ => GENERIC_APP_NAME,
        };

        Self {
            country,
            app_headers: AppHeaders {
                app_name: app_name.to_string(),
                fp_api_key: DEFAULT_OAUTH_CLIENT_ID.to_string(),
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            firebase: FirebaseApp::default(),
        }
    }

    /// Replace the profile user agent when `user_agent` is non-empty.
    pub fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        if let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
            self.app_headers.user_agent = ua.to_string();
        }
        self
    }
}

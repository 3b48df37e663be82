use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Maximum number of body characters included in a rendered failure.
pub const MAX_ERROR_BODY_CHARS: usize = 300;

/// A non-2xx response that matched no known structured shape.
///
/// The full body is retained so callers can classify it, but `Display` only
/// ever renders the first [`MAX_ERROR_BODY_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl HttpFailure {
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Body cut to [`MAX_ERROR_BODY_CHARS`] characters, with `…` appended when cut.
    pub fn truncated_body(&self) -> String {
        let mut chars = self.body.chars();
        let head: String = chars.by_ref().take(MAX_ERROR_BODY_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: HTTP {}: {}",
            self.method,
            self.url,
            self.status,
            self.truncated_body()
        )
    }
}

impl std::error::Error for HttpFailure {}

/// Summarize a response body for logs without echoing its content.
pub fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

//! Logging initialization.
//!
//! Logs go to stderr so they never mix with command output on stdout.
//! `RUST_LOG` takes precedence, then `FORKFUL_LOG_LEVEL`, then the level
//! passed by the caller. `FORKFUL_LOG_FORMAT=json` switches to one JSON
//! object per line.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let level = std::env::var("FORKFUL_LOG_LEVEL")
        .ok()
        .and_then(non_empty_env)
        .unwrap_or_else(|| level.to_string());
    let default_filter = parse_level(&level).to_string().to_ascii_lowercase();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let json = std::env::var("FORKFUL_LOG_FORMAT")
        .ok()
        .and_then(non_empty_env)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

/// Parse a level name, falling back to `INFO` for anything unrecognized.
pub fn parse_level(raw: &str) -> Level {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn non_empty_env(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

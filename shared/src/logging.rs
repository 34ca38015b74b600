//! Tracing setup shared by every Lambda binary.

use tracing_subscriber::EnvFilter;

/// Translate the `LOG_LEVEL` setting into a filter directive.
///
/// `NORMAL` shows the sync outcome, `WARN` adds per-request detail and
/// `DEBUG` adds raw API traffic. Anything else is taken as a directive.
pub fn directive_for(log_level: Option<&str>) -> String {
    match log_level.map(|level| level.trim().to_ascii_uppercase()) {
        None => "info".to_string(),
        Some(level) => match level.as_str() {
            "" | "NORMAL" => "info".to_string(),
            "WARN" => "debug".to_string(),
            "DEBUG" => "trace".to_string(),
            _ => log_level.unwrap_or("info").trim().to_string(),
        },
    }
}

/// Install the JSON subscriber. `RUST_LOG` takes precedence over `LOG_LEVEL`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").ok();
        EnvFilter::new(directive_for(level.as_deref()))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();
}

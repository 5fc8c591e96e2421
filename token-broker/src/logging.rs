//! Tracing subscriber setup.

use chrono::Local;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "token_broker=info,douyin_openapi=info";

/// Timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Install the global subscriber.
///
/// `filter` overrides `RUST_LOG`, which in turn overrides
/// [`DEFAULT_LOG_FILTER`]. Returns `false` when a subscriber was already
/// installed, so tests may call this repeatedly.
pub fn init_logging(filter: Option<&str>, json: bool) -> bool {
    let env_filter = build_filter(filter);

    let (plain, structured) = if json {
        (None, Some(fmt::layer().json().with_timer(LocalTimer)))
    } else {
        (Some(fmt::layer().with_ansi(true).with_timer(LocalTimer)), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain)
        .with(structured)
        .try_init()
        .is_ok()
}

/// Unparsable directives fall back to [`DEFAULT_LOG_FILTER`].
fn build_filter(filter: Option<&str>) -> EnvFilter {
    match filter {
        Some(directive) => EnvFilter::try_new(directive).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("token_broker=info"));
        assert!(DEFAULT_LOG_FILTER.contains("douyin_openapi=info"));
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_filter_override_and_fallback() {
        let custom = build_filter(Some("token_broker=debug")).to_string();
        assert!(custom.contains("token_broker=debug"));

        let fallback = build_filter(Some("token_broker=loudest")).to_string();
        assert!(fallback.contains("douyin_openapi=info"));
    }

    #[test]
    fn test_init_is_repeatable() {
        init_logging(Some("token_broker=debug"), false);
        assert!(!init_logging(None, true));
    }
}

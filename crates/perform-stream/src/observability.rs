use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "perform-stream.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    ["PERFORM_OBSERVABILITY_ENABLED", "PERFORM_OBSERVABILITY"]
        .iter()
        .find_map(|key| std::env::var(key).ok())
        .map(|value| parse_bool_env(&value).unwrap_or(true))
        .unwrap_or(true)
}

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("PERFORM_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// File appender for `PERFORM_JSON_LOG_PATH`, creating its directory.
fn json_log_writer(raw: &str) -> tracing_appender::rolling::RollingFileAppender {
    let path = Path::new(raw);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let _ = std::fs::create_dir_all(dir);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    tracing_appender::rolling::never(dir, file_name)
}

/// Installs the global tracing subscriber for a stream consumer process.
///
/// The library only emits events: `debug!` per routed or dropped frame,
/// `info!` per session state change and `warn!` on transport failures, all
/// inside a `stream_session` span carrying the session id and run
/// generation. A binary such as `perform-cli` calls this once at startup to
/// make them visible; later calls do nothing.
///
/// Environment variables:
/// - `PERFORM_OBSERVABILITY_ENABLED` / `PERFORM_OBSERVABILITY`: enable flag (default enabled).
/// - `PERFORM_LOG_LEVEL`: filter override, e.g. `perform_stream=debug` to see every frame.
/// - `PERFORM_JSON_LOG_PATH`: write JSONL (with the `stream_session` span list) to this
///   file instead of compact console logs on stdout.
/// - `RUST_LOG`: used when `PERFORM_LOG_LEVEL` is unset or invalid.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }
        let registry = tracing_subscriber::registry().with(resolve_env_filter());
        let json_path = std::env::var("PERFORM_JSON_LOG_PATH")
            .ok()
            .filter(|raw| !raw.trim().is_empty());
        let installed = match json_path {
            Some(raw) => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(false)
                        .with_writer(json_log_writer(raw.trim())),
                )
                .try_init(),
            None => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stdout),
                )
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!("a global subscriber was already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::{json_log_writer, parse_bool_env};

    #[test]
    fn parses_common_boolean_spellings() {
        for on in ["1", "TRUE", " yes ", "on", "Enabled"] {
            assert_eq!(parse_bool_env(on), Some(true), "{on}");
        }
        for off in ["0", "false", "No", "off", "disabled"] {
            assert_eq!(parse_bool_env(off), Some(false), "{off}");
        }
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn json_log_writer_creates_missing_directories() {
        let dir = std::env::temp_dir().join(format!("perform-logs-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("run.jsonl");
        let _writer = json_log_writer(path.to_str().expect("utf-8 path"));
        assert!(dir.join("nested").is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

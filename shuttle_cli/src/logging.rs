//! Console and file log sinks.
//!
//! Console output goes to stderr so the run summary on stdout stays clean.
//! `RUST_LOG` takes precedence over `--log-level` when set.

use shuttle_config::Logging;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

fn console_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn rotation(name: Option<&str>) -> Rotation {
    match name {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    }
}

/// Install the global subscriber. `file_cfg` adds a JSON-lines file sink.
///
/// Hold the returned guard until exit; dropping it flushes the file sink.
/// A second call leaves the first subscriber in place.
pub fn init(json: bool, level: &str, file_cfg: Option<&Logging>) -> Option<WorkerGuard> {
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter(level))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter(level))
            .boxed()
    };

    let mut guard = None;
    let file = file_cfg.and_then(|cfg| {
        let path = Path::new(cfg.file.as_deref()?);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let dir = dir.unwrap_or_else(|| Path::new("."));
        let name = path.file_name()?;
        let appender =
            RollingFileAppender::new(rotation(cfg.rotation.as_deref()), dir, name);
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        let filter = EnvFilter::try_new(cfg.level.as_deref().unwrap_or("info"))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        Some(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_rotation_never_rotates() {
        assert_eq!(rotation(Some("weekly")), Rotation::NEVER);
        assert_eq!(rotation(None), Rotation::NEVER);
        assert_eq!(rotation(Some("hourly")), Rotation::HOURLY);
    }
}

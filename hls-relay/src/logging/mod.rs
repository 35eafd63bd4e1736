//! Logging setup.
//!
//! Console output is always on; JSON formatting and a daily-rolling log file
//! are optional. Timestamps use the server's local timezone.

use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "hls_relay=info,stream_extractor=info,tower_http=info";

const LOG_FILE_PREFIX: &str = "hls-relay.log";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions<'a> {
    /// Filter directive; `RUST_LOG` wins when set, then this, then the default.
    pub filter: Option<&'a str>,
    pub json: bool,
    /// Directory for a daily-rolling log file.
    pub log_dir: Option<&'a Path>,
}

/// Resolve the effective filter directive.
pub fn build_filter(directive: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directive.unwrap_or(DEFAULT_LOG_FILTER))
        .map_err(|e| Error::config(format!("Invalid filter directive: {e}")))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must live as long as the
/// process logs.
pub fn init(options: LoggingOptions<'_>) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(options.filter)?;

    let console = if options.json {
        fmt::layer().json().with_timer(LocalTimer).boxed()
    } else {
        fmt::layer().with_timer(LocalTimer).boxed()
    };

    let (file_layer, guard) = match options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_timer(LocalTimer)
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to install log subscriber: {e}")))?;

    Ok(guard)
}

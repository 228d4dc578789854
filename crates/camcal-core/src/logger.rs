//! Minimal stderr logger.
//!
//! Prints `[elapsed LEVEL] message`. Install once at startup with
//! [`init_with_level`] or [`init_from_env`] (reads `CAMCAL_LOG`).

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log level (`error`..`trace`, `off`).
pub const LOG_ENV: &str = "CAMCAL_LOG";

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let _ = writeln!(
            std::io::stderr(),
            "[{:7.3}s {:>5}] {}",
            elapsed,
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the logger with `level`. Later calls are no-ops.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Parse a level name; unknown or empty input gives `None`.
pub fn parse_level(s: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(s.trim()).ok()
}

/// Install the logger with the level from `CAMCAL_LOG`, else `fallback`.
pub fn init_from_env(fallback: LevelFilter) -> Result<(), log::SetLoggerError> {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or(fallback);
    init_with_level(level)
}

/// Install a `tracing` fmt subscriber. `directive` overrides `CAMCAL_LOG`;
/// the default is `info`.
#[cfg(feature = "tracing")]
pub fn init_tracing(directive: Option<&str>, json: bool) {
    let filter = match directive {
        Some(d) => EnvFilter::new(d),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    if json {
        let _ = builder.json().flatten_event(true).finish().try_init();
    } else {
        let _ = builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

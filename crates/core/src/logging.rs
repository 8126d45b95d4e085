//! Subscriber setup for the binaries.

use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crate targets logged at `info` unless `RUST_LOG` says otherwise.
const DEFAULT_DIRECTIVES: [&str; 3] = ["cinelink=info", "registry=info", "imaging=info"];

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log directive: {0}")]
    Directive(#[from] ParseError),
    #[error("cannot open log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("logging already initialised: {0}")]
    Init(#[from] TryInitError),
}

/// `<date>-<registry name>.log`
pub fn log_file_name(date: NaiveDate, registry_name: &str) -> String {
    format!("{}-{registry_name}.log", date.format("%Y-%m-%d"))
}

/// `RUST_LOG` when set and non-blank, the default crate directives otherwise.
fn log_filter(rust_log: Option<&str>) -> Result<EnvFilter, ParseError> {
    match rust_log.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_new(DEFAULT_DIRECTIVES.join(",")),
    }
}

/// Install the global subscriber: console output always, plus an appending per-day file under
/// `log_dir` when one is configured. Returns the file path in that case.
pub fn init_logging(
    log_dir: Option<&Path>,
    registry_name: &str,
    today: NaiveDate,
) -> Result<Option<PathBuf>, LoggingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(rust_log.as_deref())?;

    let (file_layer, file_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(log_file_name(today, registry_name));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(file_path)
}

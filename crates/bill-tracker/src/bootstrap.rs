use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file used by the interactive views when `--log-file` is not given.
pub const DEFAULT_LOG_FILE_NAME: &str = "bill-tracker.log";

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// `~/.bill-tracker`, or `./.bill-tracker` without a home directory.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bill-tracker")
}

/// Ensure `~/.bill-tracker/{logs}` and the data directory exist.
pub fn ensure_directories(data_dir: &Path) -> anyhow::Result<()> {
    ensure_directories_in(&app_dir(), data_dir)
}

fn ensure_directories_in(app_dir: &Path, data_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(app_dir.join("logs"))
        .with_context(|| format!("creating {}", app_dir.display()))?;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    Ok(())
}

/// Default log file for the full-screen views, which own stderr's terminal.
pub fn default_log_file() -> PathBuf {
    app_dir().join("logs").join(DEFAULT_LOG_FILE_NAME)
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name to a tracing filter directive.
pub fn level_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. Output goes to stderr, or
/// is appended to `log_file` without colours when one is given.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_directive(log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (stderr_layer, file_layer) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => {
            let layer = fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr);
            (Some(layer), None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! Log routing for the two docbrief binaries.
//!
//! The server writes human-readable events to stdout and a copy to a log file, by default
//! `logs/docbrief.log` or the path in `DOCBRIEF_LOG_FILE`. The CLI keeps stdout for its own output
//! (artifact path or JSON) and sends events to stderr only. `RUST_LOG` overrides the default level
//! of either binary.
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "DOCBRIEF_LOG_FILE";
const LOG_DIR: &str = "logs";
const LOG_FILE_NAME: &str = "docbrief.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the server subscriber: stdout plus the log file, filtered at `info` by default.
///
/// Request failures are still visible on stdout when the log file cannot be opened.
pub fn init_tracing() {
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(filter("info"))
        .with(stdout_layer);

    match open_log_file(&log_file_path(std::env::var_os(LOG_FILE_ENV))) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Install the CLI subscriber: stderr only, `warn` by default or `debug` with `--verbose`.
pub fn init_cli_tracing(verbose: bool) {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter(if verbose { "debug" } else { "warn" }))
        .with(stderr_layer)
        .init();
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Log file chosen by `DOCBRIEF_LOG_FILE`, falling back to `logs/docbrief.log`.
fn log_file_path(configured: Option<OsString>) -> PathBuf {
    configured
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(LOG_DIR).join(LOG_FILE_NAME))
}

/// Append-mode non-blocking writer, or `None` when the file cannot be prepared.
fn open_log_file(path: &Path) -> Option<NonBlocking> {
    let Some(file_name) = path.file_name() else {
        eprintln!("Log file path has no file name: {}", path.display());
        return None;
    };
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("Failed to create log directory {}: {err}", dir.display());
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}

/// Run `f` under a plain-text subscriber and return its result with everything it logged.
#[cfg(test)]
pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    let output = String::from_utf8_lossy(&captured.0.lock().unwrap()).into_owned();
    (value, output)
}

//! Session logger for the engine's diagnostic output.
//!
//! A library must not write files unless the host asks, so the logger is
//! opt-in: until [`init`] (or [`init_at`]) runs, every line is dropped.
//! Initialisation truncates the log file, so it only ever holds the current
//! session and never grows across runs.
//!
//! Lines are stamped with elapsed session time rather than wall-clock time;
//! correlating engine diagnostics with user actions needs relative order
//! and spacing, not calendar dates.
//!
//! The default location is `<data dir>/paintcore/paintcore.log` (the data
//! dir being `%APPDATA%` on Windows, `~/Library/Application Support` on
//! macOS, `$XDG_DATA_HOME` or `~/.local/share` elsewhere). [`init_at`]
//! lets the host pick any path instead.
//!
//! No file handle stays open between lines: each write re-opens the file in
//! append mode and closes it again. Diagnostics are rare, nothing is held
//! locked while a panic unwinds, and external log rotation or `tail -f`
//! never fights the engine for the handle.

use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

/// Severity tag for a log line.
#[derive(Clone, Copy, Debug)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

struct Sink {
    path: PathBuf,
    started: Instant,
}

static SINK: OnceLock<Sink> = OnceLock::new();

/// Path of the active session log, if the logger has been initialised.
pub fn log_path() -> Option<&'static Path> {
    SINK.get().map(|sink| sink.path.as_path())
}

/// Append one tagged, session-time-stamped line. Dropped while the logger
/// is uninitialised; I/O errors are swallowed so logging can never take the
/// host down.
pub fn write(level: Level, message: &str) {
    let Some(sink) = SINK.get() else {
        return;
    };
    let elapsed = sink.started.elapsed().as_secs_f64();
    let line = format!("[{elapsed:10.3}s] [{}] {message}\n", level.tag());
    if let Ok(mut file) = OpenOptions::new().append(true).open(&sink.path) {
        let _ = file.write_all(line.as_bytes());
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Initialise the logger at the default platform location.
pub fn init() {
    init_at(default_dir().join("paintcore").join("paintcore.log"));
}

/// Initialise the logger at an explicit path. The first successful call
/// wins; later calls are no-ops. Anything a previous session left in the
/// file is discarded, and panics are mirrored into the log from here on.
pub fn init_at(path: PathBuf) {
    if SINK.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    // Truncate once here; every later write appends.
    if fs::write(&path, b"").is_err() {
        eprintln!("[logger] cannot open {:?}; logging stays disabled", path);
        return;
    }
    if SINK.set(Sink { path, started: Instant::now() }).is_err() {
        return;
    }
    write(
        Level::Info,
        concat!("paintcore ", env!("CARGO_PKG_VERSION"), " session log"),
    );

    // Mirror panic messages into the log before the default handler runs.
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Error, &format!("panic: {info}"));
        previous(info);
    }));
}

/// Platform data directory for the default log location.
fn default_dir() -> PathBuf {
    let resolved = if cfg!(target_os = "windows") {
        env::var_os("APPDATA").map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        env::var_os("HOME")
            .map(|home| PathBuf::from(home).join("Library").join("Application Support"))
    } else {
        env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("share")))
    };
    resolved.unwrap_or_else(|| PathBuf::from("."))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_without_init_does_not_panic() {
        // Depending on test order the logger may already be initialised by
        // the sibling test; either way these must not blow up.
        write(Level::Warn, "possibly dropped");
        crate::log_err!("macro path {}", 1);
    }

    #[test]
    fn init_at_appends_tagged_lines() {
        let path = env::temp_dir().join("paintcore-logger-test.log");
        init_at(path.clone());
        crate::log_info!("hello {}", 7);
        crate::log_warn!("watch {}", 8);
        // Assert against whatever file this process actually logs to; a
        // first-wins init from another test keeps the sink valid. Skip if
        // the environment refused the temp file entirely.
        let Some(active) = log_path() else { return };
        let content = fs::read_to_string(active).unwrap_or_default();
        assert!(content.contains("[INFO] hello 7"));
        assert!(content.contains("[WARN] watch 8"));
    }
}

//! Run log for conductor.
//!
//! Every component writes through the `clog*` macros with a bracketed tag
//! (`[orchestrator]`, `[engine]`, `[scheduler]`, `[bus]`, `[workflow]`), so
//! one run can be followed wave by wave in `~/.conductor/conductor.log`.
//!
//! The threshold comes from, in order: `CONDUCTOR_LOG=<level>`, then
//! `--debug` or `CONDUCTOR_DEBUG=1` (debug), then info. Until [`init`] runs
//! there is no sink, so library callers and tests log nothing and the
//! format arguments are never rendered.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::config::Settings;

static SINK: OnceLock<PathBuf> = OnceLock::new();
static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Severity of a log line. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// A run aborted on an invalid task graph.
    Error = 0,
    /// A task failed, timed out, or emitted a bad envelope.
    Warn = 1,
    /// Run and wave boundaries.
    Info = 2,
    /// Per-task model, context and timing.
    Debug = 3,
    /// Bus deliveries and scheduler internals.
    Trace = 4,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_repr(raw: u8) -> Self {
        match raw {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Start logging at the default threshold.
pub fn init() {
    init_with_debug(false);
}

/// Start logging; `debug` comes from the `--debug` flag.
pub fn init_with_debug(debug: bool) {
    let level = threshold_from(
        std::env::var("CONDUCTOR_LOG").ok().as_deref(),
        debug || env_flag("CONDUCTOR_DEBUG"),
    );
    set_level(level);

    // Without a home directory the run simply goes unlogged.
    if let Ok(dir) = Settings::conductor_dir() {
        if std::fs::create_dir_all(&dir).is_ok() {
            let path = dir.join("conductor.log");
            // One log per invocation.
            let _ = std::fs::write(&path, "");
            let _ = SINK.set(path);
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// An explicit, parseable level wins over the debug switch.
fn threshold_from(explicit: Option<&str>, debug: bool) -> LogLevel {
    match explicit.map(str::parse::<LogLevel>) {
        Some(Ok(level)) => level,
        _ if debug => LogLevel::Debug,
        _ => LogLevel::Info,
    }
}

pub fn set_level(level: LogLevel) {
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

pub fn level() -> LogLevel {
    LogLevel::from_repr(THRESHOLD.load(Ordering::Relaxed))
}

/// Whether a line at `level` would be written right now.
pub fn enabled(level: LogLevel) -> bool {
    SINK.get().is_some() && level <= self::level()
}

/// The log file, once [`init`] has run.
pub fn log_path() -> Option<&'static PathBuf> {
    SINK.get()
}

/// Append one line. Used by the `clog*` macros.
pub fn write_line(level: LogLevel, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let Some(path) = SINK.get() else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(
            file,
            "[{}] [{}] {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            level,
            args
        );
    }
}

/// Info: run lifecycle.
#[macro_export]
macro_rules! clog {
    ($($arg:tt)*) => {
        $crate::log::write_line($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_error {
    ($($arg:tt)*) => {
        $crate::log::write_line($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_warn {
    ($($arg:tt)*) => {
        $crate::log::write_line($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_debug {
    ($($arg:tt)*) => {
        $crate::log::write_line($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_trace {
    ($($arg:tt)*) => {
        $crate::log::write_line($crate::log::LogLevel::Trace, format_args!($($arg)*))
    };
}

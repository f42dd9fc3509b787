//! Leveled logging through an injected sink
//!
//! Components never log to a global. They hold a [`Logger`] (an
//! `Arc<dyn LogSink>`) handed to them at construction and log through the
//! `perror!` .. `ptrace!` macros, which skip formatting entirely when the
//! sink has the level disabled.
//!
//! # Sinks
//!
//! - [`StderrSink`] - `[LEVEL]`-prefixed lines on stderr, written under the
//!   stderr lock so lines from different threads never interleave. Can
//!   flush after every line (useful when chasing a crash).
//! - [`TracingSink`] - forwards every record to `tracing`, so the host
//!   process decides formatting and filtering with its subscriber.
//! - [`NullSink`] - discards everything.
//!
//! # Usage
//!
//! ```ignore
//! use photon_core::log::{LogLevel, StderrSink};
//! use photon_core::pinfo;
//!
//! let log = StderrSink::new(LogLevel::Debug).into_logger();
//! pinfo!(log, "listening on {}:{}", host, port);
//! ```

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Log levels, most severe first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown log level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level {0:?} (expected off|error|warn|info|debug|trace or 0-5)")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "1" => Ok(LogLevel::Error),
            "warn" | "warning" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

impl<'de> serde::Deserialize<'de> for LogLevel {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A destination for leveled log records.
///
/// **Contract:**
/// - `log()` must never panic and must tolerate being called from any
///   thread (the rpc client may log from application threads).
/// - `enabled()` is checked by the macros before any formatting happens.
pub trait LogSink: Send + Sync {
    /// Whether records at `level` would be kept.
    fn enabled(&self, level: LogLevel) -> bool;

    /// Emit one record. Callers have already checked `enabled`.
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>);
}

/// Shared handle to a sink, cloned into every component.
pub type Logger = Arc<dyn LogSink>;

/// Writes `[LEVEL] message` lines to stderr.
pub struct StderrSink {
    level: AtomicU8,
    flush: AtomicBool,
}

impl StderrSink {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level: AtomicU8::new(level as u8),
            flush: AtomicBool::new(false),
        }
    }

    /// Flush stderr after every record.
    pub fn with_flush(self, flush: bool) -> Self {
        self.flush.store(flush, Ordering::Relaxed);
        self
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn into_logger(self) -> Logger {
        Arc::new(self)
    }
}

impl LogSink for StderrSink {
    #[inline]
    fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.level()
    }

    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = write!(handle, "{} ", level.prefix());
        let _ = handle.write_fmt(args);
        let _ = handle.write_all(b"\n");
        if self.flush.load(Ordering::Relaxed) {
            let _ = handle.flush();
        }
    }
}

/// Forwards records to the `tracing` crate.
///
/// Filtering is left to the installed subscriber; `enabled` only applies
/// the coarse ceiling given at construction.
pub struct TracingSink {
    ceiling: LogLevel,
}

impl TracingSink {
    pub fn new(ceiling: LogLevel) -> Self {
        Self { ceiling }
    }

    pub fn into_logger(self) -> Logger {
        Arc::new(self)
    }
}

impl LogSink for TracingSink {
    #[inline]
    fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.ceiling
    }

    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        match level {
            LogLevel::Off => {}
            LogLevel::Error => tracing::error!(target: "photon", "{}", args),
            LogLevel::Warn => tracing::warn!(target: "photon", "{}", args),
            LogLevel::Info => tracing::info!(target: "photon", "{}", args),
            LogLevel::Debug => tracing::debug!(target: "photon", "{}", args),
            LogLevel::Trace => tracing::trace!(target: "photon", "{}", args),
        }
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NullSink {
    pub fn logger() -> Logger {
        Arc::new(NullSink)
    }
}

impl LogSink for NullSink {
    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }

    fn log(&self, _level: LogLevel, _args: fmt::Arguments<'_>) {}
}

#[doc(hidden)]
#[inline]
pub fn _plog_impl(sink: &dyn LogSink, level: LogLevel, args: fmt::Arguments<'_>) {
    if sink.enabled(level) {
        sink.log(level, args);
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Log at an explicit level: `plog!(sink, LogLevel::Warn, "x={}", x)`.
#[macro_export]
macro_rules! plog {
    ($sink:expr, $level:expr, $($arg:tt)*) => {{
        let sink: &dyn $crate::log::LogSink = &*$sink;
        if sink.enabled($level) {
            $crate::log::_plog_impl(sink, $level, format_args!($($arg)*));
        }
    }};
}

/// Error level log
#[macro_export]
macro_rules! perror {
    ($sink:expr, $($arg:tt)*) => {
        $crate::plog!($sink, $crate::log::LogLevel::Error, $($arg)*)
    };
}

/// Warning level log
#[macro_export]
macro_rules! pwarn {
    ($sink:expr, $($arg:tt)*) => {
        $crate::plog!($sink, $crate::log::LogLevel::Warn, $($arg)*)
    };
}

/// Info level log
#[macro_export]
macro_rules! pinfo {
    ($sink:expr, $($arg:tt)*) => {
        $crate::plog!($sink, $crate::log::LogLevel::Info, $($arg)*)
    };
}

/// Debug level log
#[macro_export]
macro_rules! pdebug {
    ($sink:expr, $($arg:tt)*) => {
        $crate::plog!($sink, $crate::log::LogLevel::Debug, $($arg)*)
    };
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ptrace {
    ($sink:expr, $($arg:tt)*) => {
        $crate::plog!($sink, $crate::log::LogLevel::Trace, $($arg)*)
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Captures formatted records in memory.
    struct Capture {
        level: LogLevel,
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl LogSink for Capture {
        fn enabled(&self, level: LogLevel) -> bool {
            level != LogLevel::Off && level <= self.level
        }

        fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
            self.lines.lock().unwrap().push((level, args.to_string()));
        }
    }

    #[test]
    fn test_log_levels() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!(" WARN ".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("0".parse::<LogLevel>(), Ok(LogLevel::Off));
        assert_eq!("5".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_macros_filter_by_level() {
        let cap = Arc::new(Capture {
            level: LogLevel::Info,
            lines: Mutex::new(Vec::new()),
        });
        let log: Logger = cap.clone();

        perror!(log, "bind failed: {}", 98);
        pwarn!(log, "warn");
        pinfo!(log, "accepted fd={}", 7);
        pdebug!(log, "dropped");
        ptrace!(log, "dropped too");

        let lines = cap.lines.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], (LogLevel::Error, "bind failed: 98".to_string()));
        assert_eq!(lines[2], (LogLevel::Info, "accepted fd=7".to_string()));
    }

    #[test]
    fn test_stderr_sink_levels() {
        let sink = StderrSink::new(LogLevel::Warn);
        assert!(sink.enabled(LogLevel::Error));
        assert!(!sink.enabled(LogLevel::Info));
        sink.set_level(LogLevel::Off);
        assert!(!sink.enabled(LogLevel::Error));
    }

    #[test]
    fn test_null_sink_swallows() {
        let log = NullSink::logger();
        assert!(!log.enabled(LogLevel::Error));
        perror!(log, "never formatted {}", 1);
    }
}

//! A minimal, zero-dependency logging crate for the Cobalt runtime.
//!
//! This crate provides thread-safe leveled logging with automatic module path
//! capture, optional ANSI-colored output, and environment-driven configuration
//! via the `COBALT_LOG` variable.
//!
//! # Example
//!
//! ```
//! use cobalt_log::{error, warn, info, debug, Level};
//!
//! // Set the minimum log level
//! cobalt_log::set_level(Level::Debug);
//!
//! let classes = 7;
//! info!("runtime booted with {} builtin classes", classes);
//! debug!("registry segments: {:?}", vec![0, 1]);
//! warn!("pool popped with live scope above it");
//! error!("allocation failed");
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels ordered from most severe (Error) to least severe (Trace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Critical failures and errors.
    Error = 0,
    /// Potentially harmful situations.
    Warn = 1,
    /// Informational messages.
    Info = 2,
    /// Detailed diagnostic information.
    Debug = 3,
    /// Most detailed tracing information.
    Trace = 4,
}

impl Level {
    /// Returns the ANSI color code for this log level.
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m", // Red
            Level::Warn => "\x1b[33m",  // Yellow
            Level::Info => "\x1b[32m",  // Green
            Level::Debug => "\x1b[36m", // Cyan
            Level::Trace => "\x1b[35m", // Magenta
        }
    }

    /// Returns the string representation of this log level.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            4 => Level::Trace,
            _ => Level::Info,
        }
    }

    /// Parses a string into a `Level` (case-insensitive).
    ///
    /// # Example
    ///
    /// ```
    /// use cobalt_log::Level;
    ///
    /// assert_eq!(Level::parse("error"), Some(Level::Error));
    /// assert_eq!(Level::parse("INFO"), Some(Level::Info));
    /// assert_eq!(Level::parse("nope"), None);
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Option<Level> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Some(Level::Error),
            "WARN" | "WARNING" => Some(Level::Warn),
            "INFO" => Some(Level::Info),
            "DEBUG" => Some(Level::Debug),
            "TRACE" => Some(Level::Trace),
            _ => None,
        }
    }
}

/// The global logger.
///
/// Uses atomics for level and color management so logging never takes a lock.
pub struct Logger {
    level: AtomicU8,
    colors: AtomicBool,
}

impl Logger {
    /// Creates a new logger with the specified minimum level.
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            colors: AtomicBool::new(true),
        }
    }

    /// Sets the minimum log level. Messages below this level are dropped.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum log level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Enables or disables ANSI colors in the output.
    pub fn set_colors(&self, enabled: bool) {
        self.colors.store(enabled, Ordering::SeqCst);
    }

    /// Checks whether a message at the given level would be logged.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

/// Global logger singleton.
static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns a reference to the global logger instance.
///
/// The first call initializes the logger; the level comes from the
/// `COBALT_LOG` environment variable when set and parseable, and defaults to
/// `Level::Warn` otherwise.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| {
        let level = std::env::var("COBALT_LOG")
            .ok()
            .and_then(|value| Level::parse(&value))
            .unwrap_or(Level::Warn);
        Logger::new(level)
    })
}

/// Sets the minimum log level for the global logger.
///
/// # Example
///
/// ```
/// use cobalt_log::{set_level, Level};
///
/// set_level(Level::Debug);
/// ```
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Internal function that performs the actual logging.
///
/// Called by the log macros after the level check. Writes a single line to
/// stderr; interleaving between threads is line-granular because the write
/// goes through one formatted string.
#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    const RESET: &str = "\x1b[0m";

    let logger = get_logger();
    if !logger.enabled(level) {
        return;
    }

    let line = if logger.colors.load(Ordering::Relaxed) {
        format!("{}[{}]{} {}: {}\n", level.color_code(), level.as_str(), RESET, target, args)
    } else {
        format!("[{}] {}: {}\n", level.as_str(), target, args)
    };
    let _ = std::io::stderr().write_all(line.as_bytes());
}

/// The primary logging macro.
///
/// Logs a message at the specified level, capturing the module path of the
/// call site.
///
/// # Example
///
/// ```
/// use cobalt_log::{log, Level};
///
/// # cobalt_log::set_level(Level::Info);
/// log!(level: Level::Info, "registered class id {}", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            if $crate::get_logger().enabled($level) {
                $crate::__log_with_target(
                    $level,
                    module_path!(),
                    format_args!($($arg)*)
                );
            }
        }
    };
}

/// Logs a message at the Error level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs a message at the Warn level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs a message at the Info level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs a message at the Debug level.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs a message at the Trace level.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}

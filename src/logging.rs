//! Log severity levels and the bridge to the `log` facade.
//!
//! The engine never logs on its own: every log event goes through the
//! host seam as a `(LogLevel, Arguments)` pair, formatted lazily and
//! without allocation. Hosts that want standard Rust logging forward the
//! events here, and whatever logger the embedder installed (env_logger in
//! the tests) takes it from there.

use core::fmt;

/// Severity of an engine log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Forward one engine log event to the `log` facade.
///
/// Intended for host implementations:
///
/// ```ignore
/// fn log(&mut self, level: LogLevel, args: fmt::Arguments<'_>) {
///     logging::forward_to_log_facade(level, args);
/// }
/// ```
pub fn forward_to_log_facade(level: LogLevel, args: fmt::Arguments<'_>) {
    log::log!(level.into(), "{args}");
}

//! Severity-gated logging sink.
//!
//! The formatter writes every message both here and to the event log. The
//! production implementation forwards to `tracing`; tests substitute a
//! recording implementation.

use super::event_log::LogLevel;
use std::error::Error;
use std::fmt;

/// `tracing` target used for decision messages.
pub const EVENT_TARGET: &str = "mimic_proxy::events";

/// A leveled logger with an explicit enabled check, so callers can skip
/// formatting entirely when a severity is off.
pub trait LeveledLogger: Send + Sync {
    fn is_enabled(&self, level: LogLevel) -> bool;

    fn info(&self, message: &str);

    /// Log at error severity, attaching `cause` when present.
    fn error(&self, message: &str, cause: Option<&(dyn Error + 'static)>);
}

/// Renders an error followed by its `source()` chain: `outer: inner: root`.
pub struct ErrorChain<'a>(pub &'a (dyn Error + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}

/// [`LeveledLogger`] backed by the global `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl LeveledLogger for TracingLogger {
    fn is_enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Info => tracing::enabled!(target: EVENT_TARGET, tracing::Level::INFO),
            LogLevel::Error => tracing::enabled!(target: EVENT_TARGET, tracing::Level::ERROR),
        }
    }

    fn info(&self, message: &str) {
        tracing::info!(target: EVENT_TARGET, "{}", message);
    }

    fn error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        match cause {
            Some(cause) => {
                tracing::error!(target: EVENT_TARGET, error = %ErrorChain(cause), "{}", message)
            }
            None => tracing::error!(target: EVENT_TARGET, "{}", message),
        }
    }
}

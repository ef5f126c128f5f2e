//! Correlated logging.
//!
//! - `event_log`: the shared, append-only [`EventLogStore`]
//! - `leveled`: the severity-gated [`LeveledLogger`] sink and its `tracing` backend
//! - `formatter`: [`LoggingFormatter`], which renders templates and writes to both sinks

mod event_log;
mod formatter;
mod leveled;

#[cfg(test)]
pub(crate) mod testing;

pub use event_log::{EventLogStore, LogEntry, LogEntryKind, LogLevel};
pub use formatter::{
    best_effort, format_message, Correlation, FormatError, LoggingFormatter, PLACEHOLDER,
};
pub use leveled::{ErrorChain, LeveledLogger, TracingLogger, EVENT_TARGET};

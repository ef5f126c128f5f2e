//! Two-sink message formatter.
//!
//! Renders `{}` templates and writes the result once to the leveled logger
//! and once per correlated request to the event log. When the target
//! severity is disabled nothing is formatted and nothing is written.

use super::event_log::{EventLogStore, LogEntry, LogLevel};
use super::leveled::LeveledLogger;
use crate::model::HttpRequest;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Positional placeholder consumed left-to-right by the arguments.
pub const PLACEHOLDER: &str = "{}";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("template has {placeholders} placeholder(s) but {arguments} argument(s) were supplied")]
    ArgumentMismatch { placeholders: usize, arguments: usize },
}

/// Substitute `args` into `template`.
///
/// Single-line arguments are spliced inline. An argument containing line
/// breaks is replaced by a line break, an empty line, then each of its lines
/// prefixed with a tab and terminated by a line break.
pub fn format_message(template: &str, args: &[&dyn fmt::Display]) -> Result<String, FormatError> {
    let placeholders = template.matches(PLACEHOLDER).count();
    if placeholders != args.len() {
        return Err(FormatError::ArgumentMismatch {
            placeholders,
            arguments: args.len(),
        });
    }

    let mut pieces = template.split(PLACEHOLDER);
    let mut message = String::with_capacity(template.len());
    if let Some(first) = pieces.next() {
        message.push_str(first);
    }
    for (arg, piece) in args.iter().zip(pieces) {
        push_argument(&mut message, &arg.to_string());
        message.push_str(piece);
    }
    Ok(message)
}

fn push_argument(message: &mut String, value: &str) {
    if !value.contains('\n') {
        message.push_str(value);
        return;
    }
    message.push_str("\n\n");
    for line in value.lines() {
        message.push('\t');
        message.push_str(line);
        message.push('\n');
    }
}

/// Logging is best-effort relative to the response being produced: a
/// malformed template is reported as a diagnostic and otherwise ignored.
pub fn best_effort(result: Result<(), FormatError>) {
    if let Err(err) = result {
        tracing::warn!(error = %err, "dropped log message");
    }
}

/// Which requests a message is recorded against.
#[derive(Debug, Clone, Copy)]
pub enum Correlation<'a> {
    None,
    One(&'a HttpRequest),
    Many(&'a [HttpRequest]),
}

impl<'a> From<&'a HttpRequest> for Correlation<'a> {
    fn from(request: &'a HttpRequest) -> Self {
        Correlation::One(request)
    }
}

impl<'a> From<&'a [HttpRequest]> for Correlation<'a> {
    fn from(requests: &'a [HttpRequest]) -> Self {
        Correlation::Many(requests)
    }
}

impl<'a> From<&'a Vec<HttpRequest>> for Correlation<'a> {
    fn from(requests: &'a Vec<HttpRequest>) -> Self {
        Correlation::Many(requests.as_slice())
    }
}

impl<'a> From<Option<&'a HttpRequest>> for Correlation<'a> {
    fn from(request: Option<&'a HttpRequest>) -> Self {
        request.map_or(Correlation::None, Correlation::One)
    }
}

/// Stateless apart from its two sinks; clone freely across tasks.
#[derive(Clone)]
pub struct LoggingFormatter {
    logger: Arc<dyn LeveledLogger>,
    store: Arc<EventLogStore>,
}

impl LoggingFormatter {
    pub fn new(logger: Arc<dyn LeveledLogger>, store: Arc<EventLogStore>) -> Self {
        Self { logger, store }
    }

    pub fn store(&self) -> &Arc<EventLogStore> {
        &self.store
    }

    pub fn info_log<'a>(
        &self,
        requests: impl Into<Correlation<'a>>,
        template: &str,
        args: &[&dyn fmt::Display],
    ) -> Result<(), FormatError> {
        self.write(LogLevel::Info, requests.into(), None, template, args)
    }

    pub fn error_log<'a>(
        &self,
        requests: impl Into<Correlation<'a>>,
        template: &str,
        args: &[&dyn fmt::Display],
    ) -> Result<(), FormatError> {
        self.write(LogLevel::Error, requests.into(), None, template, args)
    }

    /// Like [`error_log`](Self::error_log), but hands `cause` to the leveled
    /// logger. The event log only receives the formatted message.
    pub fn error_log_with_cause<'a>(
        &self,
        requests: impl Into<Correlation<'a>>,
        cause: &(dyn Error + 'static),
        template: &str,
        args: &[&dyn fmt::Display],
    ) -> Result<(), FormatError> {
        self.write(LogLevel::Error, requests.into(), Some(cause), template, args)
    }

    fn write(
        &self,
        level: LogLevel,
        correlation: Correlation<'_>,
        cause: Option<&(dyn Error + 'static)>,
        template: &str,
        args: &[&dyn fmt::Display],
    ) -> Result<(), FormatError> {
        if !self.logger.is_enabled(level) {
            return Ok(());
        }

        let message = format_message(template, args)?;
        match level {
            LogLevel::Info => self.logger.info(&message),
            LogLevel::Error => self.logger.error(&message, cause),
        }

        match correlation {
            Correlation::None => {
                self.store.append(LogEntry::message(level, None, message));
            }
            Correlation::One(request) => {
                self.store
                    .append(LogEntry::message(level, Some(request.clone()), message));
            }
            Correlation::Many(requests) => {
                for request in requests {
                    self.store.append(LogEntry::message(
                        level,
                        Some(request.clone()),
                        message.clone(),
                    ));
                }
            }
        }
        Ok(())
    }
}

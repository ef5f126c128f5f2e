//! Test doubles shared by unit tests across the crate.

use super::{LeveledLogger, LogLevel};
use parking_lot::Mutex;
use std::error::Error;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Info(String),
    Error(String, Option<String>),
}

/// Records every call; severities can be switched off individually.
pub struct RecordingLogger {
    info_enabled: bool,
    error_enabled: bool,
    calls: Mutex<Vec<Call>>,
}

impl RecordingLogger {
    pub fn new(info_enabled: bool, error_enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            info_enabled,
            error_enabled,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Both severities enabled.
    pub fn enabled() -> Arc<Self> {
        Self::new(true, true)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn errors(&self) -> Vec<(String, Option<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Error(message, cause) => Some((message, cause)),
                Call::Info(_) => None,
            })
            .collect()
    }
}

impl LeveledLogger for RecordingLogger {
    fn is_enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Info => self.info_enabled,
            LogLevel::Error => self.error_enabled,
        }
    }

    fn info(&self, message: &str) {
        self.calls.lock().push(Call::Info(message.to_string()));
    }

    fn error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        self.calls.lock().push(Call::Error(
            message.to_string(),
            cause.map(|c| c.to_string()),
        ));
    }
}


//! Action failure kinds.

use super::forward::ForwardError;
use std::error::Error;
use std::time::Duration;

/// Anything that went wrong while deciding or executing an action. The
/// action handler turns every variant into a 400 response.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("cannot determine forward target: {0}")]
    InvalidTarget(String),

    #[error("upstream {target} did not respond within {}ms", .timeout.as_millis())]
    UpstreamTimeout { target: String, timeout: Duration },

    #[error("forwarding to {target} failed")]
    Forward {
        target: String,
        #[source]
        source: ForwardError,
    },

    #[error("no callback registered with name {0}")]
    UnknownCallback(String),

    #[error("callback {name} failed")]
    Callback {
        name: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("handler panicked: {0}")]
    Panic(String),
}

impl ActionError {
    pub(crate) fn forward(target: String, source: ForwardError) -> Self {
        match source {
            ForwardError::Timeout(timeout) => ActionError::UpstreamTimeout { target, timeout },
            source => ActionError::Forward { target, source },
        }
    }

    /// Best-effort description of a panic payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ActionError::Panic(message)
    }
}

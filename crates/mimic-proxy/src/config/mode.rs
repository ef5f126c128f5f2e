//! Deployment mode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How unmatched data-plane requests are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Unmatched requests get 404
    #[default]
    Mock,
    /// Unmatched requests are forwarded to their `Host`
    Proxy,
}

impl Mode {
    pub fn is_proxy(self) -> bool {
        self == Mode::Proxy
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Mock => f.write_str("mock"),
            Mode::Proxy => f.write_str("proxy"),
        }
    }
}

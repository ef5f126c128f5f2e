//! Mimic: a programmable HTTP mock server and forward proxy.
//!
//! Requests are first offered to the control plane ([`state`]); anything it
//! does not claim goes to the [`action`] handler, which answers from an
//! expectation, forwards upstream, or returns 404. Every decision is written
//! to the leveled logger and to a queryable event log ([`logging`]).

pub mod action;
pub mod app;
pub mod config;
pub mod expectation;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod server;
pub mod state;

pub use app::Mimic;

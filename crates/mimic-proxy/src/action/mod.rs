//! Action handler: executes exactly one action for each data-plane request.
//!
//! The decision order is canned response, callback, forward, then either a
//! pure-proxy forward or a 404. Forwarding is refused when the target is one
//! of this server's own addresses; that check runs before the upstream call.

mod callback;
mod error;
mod forward;
mod handler;


pub use callback::{CallbackRegistry, ExpectationCallback, WebhookCallback};
pub use error::ActionError;
pub use forward::{ForwardError, ForwardTarget, Forwarder, HttpForwarder};
pub use handler::ActionHandler;

/// Marks responses produced by an `httpError` expectation.
pub const FAULT_HEADER: &str = "x-mimic-fault";

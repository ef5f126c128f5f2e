//! State handler: the single owner of the event log and the expectation
//! registry, and the server of control-plane operations.

mod handler;
mod routes;
mod types;


pub use handler::HttpStateHandler;
pub use routes::{ControlOperation, ControlPlaneRoutes, ControlRoute, RouteMatch};
pub use types::{RetrieveType, Verification, VerificationSequence, VerificationTimes};

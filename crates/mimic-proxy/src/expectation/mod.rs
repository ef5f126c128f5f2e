//! Expectations: what to do with a data-plane request.
//!
//! - `matcher`: [`RequestDefinition`] and the [`RequestMatcher`] capability
//! - `types`: [`Expectation`] and its [`Action`] variants
//! - `registry`: the shared [`ExpectationRegistry`]

mod matcher;
mod registry;
mod types;

pub use matcher::{
    BodyDefinition, CompiledRequestMatcher, RequestDefinition, RequestMatcher, TypedBody,
};
pub use registry::ExpectationRegistry;
pub use types::{
    Action, CallbackAction, ErrorAction, Expectation, ExpectationError, ForwardAction, Scheme,
    Times,
};

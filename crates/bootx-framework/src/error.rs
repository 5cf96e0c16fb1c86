//! Error types for the bootx framework.

use thiserror::Error;

/// A handler signature that does not match one of the supported shapes.
///
/// Raised once, when the route is registered, never while serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("handler `{name}` takes {count} parameters, at most 2 are supported")]
    TooManyInputs { name: String, count: usize },

    #[error("handler `{name}` takes 2 parameters but the first is `{found}`, not the request context")]
    FirstInputNotContext { name: String, found: &'static str },

    #[error("handler `{name}` takes the request context twice")]
    DuplicateContext { name: String },

    #[error("handler `{name}` returns {count} values, expected 1 or 2")]
    OutputArity { name: String, count: usize },

    #[error("handler `{name}` must return an error as its last value, found `{found}`")]
    LastOutputNotError { name: String, found: &'static str },

    #[error("handler `{name}` declares shape {declared} but its callable is {actual}")]
    CallableMismatch {
        name: String,
        declared: &'static str,
        actual: &'static str,
    },

    #[error("route path `{path}` must start with '/'")]
    InvalidPath { path: String },

    #[error("handler `{name}` skips pre-binding but `{payload}` cannot be built from `{{}}`: {reason}")]
    EmptyPayload {
        name: String,
        payload: &'static str,
        reason: String,
    },
}

/// Result type for registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// A token lookup string that is not `<source>:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid token lookup `{0}`, expected `header|query|param|cookie:<name>`")]
pub struct InvalidTokenLookup(pub String);

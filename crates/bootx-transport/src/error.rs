//! Transport errors.

use http::Method;
use thiserror::Error;

/// Errors raised while mounting routes or running the server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),

    #[error("route {method} {path} registered twice")]
    DuplicateRoute { method: Method, path: String },
}

pub type TransportResult<T> = Result<T, TransportError>;

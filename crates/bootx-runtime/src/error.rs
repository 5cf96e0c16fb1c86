//! Runtime error types.

use bootx_core::BoxError;
use bootx_transport::TransportError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while bootstrapping or running an application.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `Application::bootstrap` failed; nothing was served.
    #[error("{app} failed to bootstrap: {source}")]
    Bootstrap { app: String, source: BoxError },

    #[error("{app} failed to shut down: {source}")]
    Shutdown { app: String, source: BoxError },

    /// A shutdown signal handler could not be installed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),

    /// The server task panicked or was aborted.
    #[error("HTTP server task failed: {0}")]
    ServerTask(#[from] tokio::task::JoinError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

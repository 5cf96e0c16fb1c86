//! # Bootx Runtime
//!
//! Everything needed to start a bootx application:
//! - Layered configuration ([`ConfigLoader`], [`BootxConfig`])
//! - Logging setup ([`LoggingBuilder`], [`SpanEvents`])
//! - The [`Application`] trait and [`BootxRuntime`], which builds the
//!   [`Web`](bootx_framework::Web), serves it over HTTP and shuts down on
//!   Ctrl+C or SIGTERM
//!
//! ```ignore
//! use bootx_runtime::BootxRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     BootxRuntime::new()?.run(FooApp).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    BootxConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, WebConfig,
    validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{Application, BootxRuntime, RuntimeBuilder, wait_for_shutdown};

// Re-export tracing for use by applications
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for applications.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

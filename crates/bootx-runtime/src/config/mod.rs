//! Configuration for bootx applications.
//!
//! Settings are layered with figment (defaults, files, `BOOTX_*`
//! environment variables, programmatic overrides) into a [`BootxConfig`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BootxConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig,
    WebConfig,
};
pub use validation::validate_config;

//! Configuration validation.

use tracing_subscriber::filter::Directive;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BootxConfig, LogFormat, LogOutput, LoggingConfig, WebConfig};

/// Validates the entire configuration.
///
/// Log levels are checked when the configuration is extracted; unknown
/// level names never reach this point.
pub fn validate_config(config: &BootxConfig) -> ConfigResult<()> {
    validate_web_config(&config.web)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_web_config(web: &WebConfig) -> ConfigResult<()> {
    if web.host.trim().is_empty() {
        return Err(ConfigError::validation("web.host must not be empty"));
    }
    if web.port == 0 {
        return Err(ConfigError::InvalidPort(web.port));
    }
    if web.pool_capacity == 0 {
        return Err(ConfigError::validation(
            "web.pool_capacity must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "logging.format \"json\" requires the json-log feature",
        ));
    }

    for (module, level) in &logging.filters {
        let directive = format!("{module}={level}");
        if module.is_empty() || directive.parse::<Directive>().is_err() {
            return Err(ConfigError::validation(format!(
                "Invalid logging filter: {directive}"
            )));
        }
    }

    Ok(())
}

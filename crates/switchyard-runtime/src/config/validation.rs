//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, ServerConfig, SwitchyardConfig};
use switchyard_framework::CorsConfig;

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchyardConfig) -> ConfigResult<()> {
    validate_server_config(&config.server)?;
    if let Some(cors) = &config.cors {
        validate_cors_config(cors)?;
    }
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates server settings.
fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    if server.host.is_empty() {
        return Err(ConfigError::missing_field("server.host"));
    }

    if server.port == 0 {
        return Err(ConfigError::InvalidPort(server.port));
    }

    if let Some(alt_svc) = &server.alt_svc
        && alt_svc.trim().is_empty()
    {
        return Err(ConfigError::validation(
            "server.alt_svc must not be empty when set",
        ));
    }

    Ok(())
}

/// Validates cross-origin settings.
fn validate_cors_config(cors: &CorsConfig) -> ConfigResult<()> {
    for (field, value) in [
        ("cors.allow-origin", &cors.allow_origin),
        ("cors.allow-headers", &cors.allow_headers),
        ("cors.allow-methods", &cors.allow_methods),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::missing_field(field));
        }
    }

    // credentials are never honored for a wildcard origin
    if cors.allow_credentials && cors.allow_origin == "*" {
        return Err(ConfigError::validation(
            "cors.allow-credentials requires an explicit allow-origin",
        ));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter module: {module:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = SwitchyardConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_port() {
        let mut config = SwitchyardConfig::default();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPort(0))
        ));
    }

    #[test]
    fn test_validate_credentials_with_wildcard_origin() {
        let config = SwitchyardConfig {
            cors: Some(CorsConfig {
                allow_credentials: true,
                ..CorsConfig::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_file_output_without_path() {
        let mut config = SwitchyardConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}

//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ControllerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration for a daemon run: the file at `path`, or the defaults.
///
/// Both are validated.
pub fn resolve_config(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => validated(ControllerConfig::default()),
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ControllerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ControllerConfig, ConfigError> {
    validated(toml::from_str(content)?)
}

fn validated(config: ControllerConfig) -> Result<ControllerConfig, ConfigError> {
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let config = parse_config(
            r#"
            [[sessions.users]]
            tag = "user-admin"
            password = "secret"
            capabilities = ["*"]
            "#,
        )
        .unwrap();
        assert_eq!(config.sessions.users.len(), 1);
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = parse_config(
            r#"
            [listener]
            bind_address = "not-an-address"
            max_connections = 0
            "#,
        )
        .unwrap_err();

        let text = err.to_string();
        assert!(text.starts_with("Validation failed: "));
        assert!(text.contains("listener.bind_address"));
        assert!(text.contains("listener.max_connections"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/fleet.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_defaults_are_validated() {
        let config = resolve_config(None).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:17070");

        let mut broken = ControllerConfig::default();
        broken.limits.max_frame_bytes = 0;
        assert!(matches!(validated(broken), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_resolve_reads_given_path() {
        let missing = std::env::temp_dir().join(format!("fleetd-missing-{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(resolve_config(Some(&missing)), Err(ConfigError::Io(_))));
    }
}

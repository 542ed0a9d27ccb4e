//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that capability grants are well formed
//! - Detect duplicate users and conflicting listener addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ControllerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{AdmissionPolicy, ControllerConfig};
use crate::session::Capability;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ControllerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    check_policy(&mut errors, "admission.default", &config.admission.default);
    for (class, policy) in &config.admission.classes {
        check_policy(&mut errors, &format!("admission.classes.{class}"), policy);
    }

    if config.sessions.login_timeout_secs == 0 {
        errors.push(ValidationError::new("sessions.login_timeout_secs", "must be greater than 0"));
    }
    let mut tags = HashSet::new();
    for (i, user) in config.sessions.users.iter().enumerate() {
        let field = format!("sessions.users[{i}]");
        if user.tag.is_empty() {
            errors.push(ValidationError::new(format!("{field}.tag"), "must not be empty"));
        } else if !tags.insert(user.tag.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.tag"),
                format!("duplicate user {:?}", user.tag),
            ));
        }
        for grant in &user.capabilities {
            if let Err(e) = grant.parse::<Capability>() {
                errors.push(ValidationError::new(format!("{field}.capabilities"), e.to_string()));
            }
        }
    }

    if let Some(storage) = &config.storage {
        check_address(&mut errors, "storage.storage_address", &storage.storage_address);
        check_address(&mut errors, "storage.shared_storage_address", &storage.shared_storage_address);
        if storage.storage_dir.is_empty() {
            errors.push(ValidationError::new("storage.storage_dir", "must not be empty"));
        }
        if storage.shared_storage_dir.is_empty() {
            errors.push(ValidationError::new("storage.shared_storage_dir", "must not be empty"));
        }
        if storage.storage_address == storage.shared_storage_address
            && !storage.storage_address.ends_with(":0")
        {
            errors.push(ValidationError::new(
                "storage.shared_storage_address",
                "must differ from storage.storage_address",
            ));
        }
    }

    if config.limits.max_frame_bytes == 0 {
        errors.push(ValidationError::new("limits.max_frame_bytes", "must be greater than 0"));
    }
    if config.limits.max_concurrent_requests == 0 {
        errors.push(ValidationError::new("limits.max_concurrent_requests", "must be greater than 0"));
    }

    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address {value:?}")));
    }
}

fn check_policy(errors: &mut Vec<ValidationError>, field: &str, policy: &AdmissionPolicy) {
    if policy.refill_interval_ms == 0 {
        errors.push(ValidationError::new(
            format!("{field}.refill_interval_ms"),
            "must be greater than 0",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{StorageConfig, UserConfig};

    fn user(tag: &str, caps: &[&str]) -> UserConfig {
        UserConfig {
            tag: tag.to_string(),
            password: "pw".to_string(),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ControllerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ControllerConfig::default();
        config.listener.max_connections = 0;
        config.admission.default.refill_interval_ms = 0;
        config.sessions.users = vec![user("user-a", &["*"]), user("user-a", &["Bad.Method.Extra"])];
        config.limits.max_frame_bytes = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listener.max_connections"));
        assert!(fields.contains(&"admission.default.refill_interval_ms"));
        assert!(fields.contains(&"sessions.users[1].tag"));
        assert!(fields.contains(&"sessions.users[1].capabilities"));
        assert!(fields.contains(&"limits.max_frame_bytes"));
    }

    #[test]
    fn test_storage_addresses_must_differ() {
        let mut config = ControllerConfig::default();
        config.storage = Some(StorageConfig {
            storage_dir: "/var/lib/fleet/storage".into(),
            storage_address: "127.0.0.1:8040".into(),
            shared_storage_dir: "/var/lib/fleet/shared".into(),
            shared_storage_address: "127.0.0.1:8040".into(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "storage.shared_storage_address");
    }
}

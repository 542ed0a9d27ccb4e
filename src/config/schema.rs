//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! controller. All types derive Serde traits for deserialization from
//! config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the controller.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControllerConfig {
    /// API listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Admission control budgets per caller class.
    pub admission: AdmissionConfig,

    /// Login and session capability policy.
    pub sessions: SessionConfig,

    /// Facades to register on the API server.
    pub facades: FacadeConfig,

    /// Optional local storage worker.
    pub storage: Option<StorageConfig>,

    /// Wire and dispatch limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:17070").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:17070".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Token budget for one caller class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdmissionPolicy {
    /// Burst capacity.
    pub capacity: u32,

    /// Time for one token to refill, in milliseconds.
    pub refill_interval_ms: u64,
}

/// Admission control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Policy for classes without an explicit entry.
    pub default: AdmissionPolicy,

    /// Per-class policies, keyed by class name (e.g. "connection", "login").
    pub classes: HashMap<String, AdmissionPolicy>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        let mut classes = HashMap::new();
        classes.insert(
            "connection".to_string(),
            AdmissionPolicy {
                capacity: 100,
                refill_interval_ms: 10,
            },
        );
        classes.insert(
            "login".to_string(),
            AdmissionPolicy {
                capacity: 10,
                refill_interval_ms: 100,
            },
        );
        Self {
            default: AdmissionPolicy {
                capacity: 50,
                refill_interval_ms: 20,
            },
            classes,
        }
    }
}

/// A user allowed to log in, with the capabilities granted to its sessions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    /// Entity tag, e.g. "user-admin" or "machine-0".
    pub tag: String,

    /// Shared secret presented at login.
    pub password: String,

    /// Capability grants: "*", "<Facade>" or "<Facade>.<Method>".
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum lifetime of an unauthenticated connection, in seconds.
    pub login_timeout_secs: u64,

    /// Known users.
    pub users: Vec<UserConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_timeout_secs: 10,
            users: Vec::new(),
        }
    }
}

/// Demonstration facades to register.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FacadeConfig {
    /// Register `Ping` v1.
    pub ping: bool,

    /// Register `ApplicationOffers` v1.
    pub application_offers: bool,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            ping: true,
            application_offers: true,
        }
    }
}

/// Local storage worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory served on `storage_address`.
    pub storage_dir: String,

    /// Address for the private storage listener.
    pub storage_address: String,

    /// Directory served on `shared_storage_address`.
    pub shared_storage_dir: String,

    /// Address for the shared storage listener.
    pub shared_storage_address: String,
}

/// Wire and dispatch limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a single frame in bytes.
    pub max_frame_bytes: usize,

    /// Maximum in-flight requests per connection.
    pub max_concurrent_requests: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 2 * 1024 * 1024, // 2MB
            max_concurrent_requests: 64,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ControllerConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:0"

            [[sessions.users]]
            tag = "user-admin"
            password = "secret"
            capabilities = ["*"]
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:0");
        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.sessions.login_timeout_secs, 10);
        assert_eq!(config.sessions.users[0].capabilities, vec!["*"]);
        assert!(config.admission.classes.contains_key("login"));
        assert!(config.storage.is_none());
    }

    #[test]
    fn test_admission_classes_parse() {
        let config: ControllerConfig = toml::from_str(
            r#"
            [admission.default]
            capacity = 5
            refill_interval_ms = 1000

            [admission.classes.login]
            capacity = 2
            refill_interval_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.admission.default.capacity, 5);
        assert_eq!(config.admission.classes["login"].refill_interval_ms, 500);
        assert!(!config.admission.classes.contains_key("connection"));
    }
}

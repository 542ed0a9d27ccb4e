//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ControllerConfig (validated, immutable)
//!     → snapshot handed to each worker at construction
//! ```
//!
//! # Design Decisions
//! - Config is an immutable snapshot; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, ConfigError};
pub use schema::AdmissionConfig;
pub use schema::AdmissionPolicy;
pub use schema::ControllerConfig;
pub use schema::FacadeConfig;
pub use schema::LimitsConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::SessionConfig;
pub use schema::StorageConfig;
pub use schema::UserConfig;

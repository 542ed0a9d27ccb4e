//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use fleet_controller::config::{ControllerConfig, UserConfig};
use fleet_controller::{start_controller, Controller};

pub const ADMIN_TAG: &str = "user-admin";
pub const ADMIN_PASSWORD: &str = "admin-secret";
pub const READER_TAG: &str = "user-reader";
pub const READER_PASSWORD: &str = "reader-secret";

/// Config bound to an ephemeral local port, with an admin allowed
/// everything and a reader limited to `Ping`.
pub fn test_config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.sessions.users = vec![
        UserConfig {
            tag: ADMIN_TAG.to_string(),
            password: ADMIN_PASSWORD.to_string(),
            capabilities: vec!["*".to_string()],
        },
        UserConfig {
            tag: READER_TAG.to_string(),
            password: READER_PASSWORD.to_string(),
            capabilities: vec!["Ping".to_string()],
        },
    ];
    config
}

/// Start a controller from `config` and return it with its API address.
pub async fn start(config: ControllerConfig) -> (Controller, String) {
    let controller = start_controller(&config).await.unwrap();
    let addr = controller.api_addr().to_string();
    (controller, addr)
}

/// Poll `check` until it holds or `within` elapses.
pub async fn wait_until<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

//! Facade caller and client facade.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::connection::Connection;
use crate::api::error::ApiError;

/// Issues calls to one facade at the version negotiated at login.
#[derive(Clone)]
pub struct FacadeCaller {
    conn: Connection,
    facade: String,
    version: u32,
}

impl FacadeCaller {
    /// Call `method` with `params` and decode the result as `R`.
    ///
    /// Remote errors come back as [`ApiError::Remote`] with their kind intact.
    pub async fn facade_call<P, R>(&self, method: &str, params: &P) -> Result<R, ApiError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(ApiError::Encode)?;
        let value = self.conn.call(&self.facade, self.version, method, params).await?;
        serde_json::from_value(value).map_err(ApiError::Decode)
    }

    pub fn best_api_version(&self) -> u32 {
        self.version
    }
}

/// The caller-visible half of a facade client: version bookkeeping and close.
pub struct ClientFacade {
    conn: Connection,
    facade: String,
    version: u32,
    closed: AtomicBool,
}

impl ClientFacade {
    /// Version of the facade chosen at login.
    pub fn best_api_version(&self) -> u32 {
        self.version
    }

    /// Close the underlying connection. Idempotent.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(facade = %self.facade, "Closing client facade");
            self.conn.close().await;
        }
    }
}

/// Build a client for `facade` at the highest version the server offered.
pub fn new_client_facade(conn: &Connection, facade: &str) -> Result<(ClientFacade, FacadeCaller), ApiError> {
    new_client_facade_with_versions(conn, facade, &[])
}

/// Build a client for `facade` at the highest version offered by the server
/// that is also in `supported`.
pub fn new_client_facade_with_versions(
    conn: &Connection,
    facade: &str,
    supported: &[u32],
) -> Result<(ClientFacade, FacadeCaller), ApiError> {
    let version = conn
        .best_facade_version(facade, supported)
        .ok_or_else(|| ApiError::NoCompatibleVersion {
            facade: facade.to_string(),
        })?;

    let front = ClientFacade {
        conn: conn.clone(),
        facade: facade.to_string(),
        version,
        closed: AtomicBool::new(false),
    };
    let back = FacadeCaller {
        conn: conn.clone(),
        facade: facade.to_string(),
        version,
    };
    Ok((front, back))
}

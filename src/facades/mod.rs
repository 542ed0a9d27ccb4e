//! Facades served by the controller.
//!
//! Each facade module exposes a constructor returning a [`FacadeSpec`] for
//! one version; [`build_registry`] registers the ones enabled in
//! configuration.

pub mod offers;
pub mod ping;

use std::sync::Arc;

use crate::config::FacadeConfig;
use crate::facade::{FacadeRegistry, FacadeSpec, RegistryBuilder, RegistryError};

pub use offers::{application_offers_v1, OfferStore, OFFERS_FACADE};
pub use ping::{ping_v1, PING_FACADE};

/// Register every facade enabled in `config`.
pub fn build_registry(config: &FacadeConfig) -> Result<FacadeRegistry, RegistryError> {
    let mut specs: Vec<FacadeSpec> = Vec::new();
    if config.ping {
        specs.push(ping_v1());
    }
    if config.application_offers {
        specs.push(application_offers_v1(Arc::new(OfferStore::new())));
    }

    let mut builder = RegistryBuilder::new();
    for spec in specs {
        builder = builder.register(spec)?;
    }
    Ok(builder.build())
}

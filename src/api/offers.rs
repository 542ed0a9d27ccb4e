//! Typed client for the `ApplicationOffers` facade.

use crate::api::connection::Connection;
use crate::api::error::ApiError;
use crate::api::facade::{new_client_facade_with_versions, ClientFacade, FacadeCaller};
use crate::facades::offers::{
    AddApplicationOffer, AddApplicationOffers, ApplicationOffer, ApplicationOfferFilter, ErrorResult, ErrorResults,
    FindApplicationOffersResults, OfferFilters, OFFERS_FACADE,
};

/// Facade versions this client knows how to speak.
const SUPPORTED_VERSIONS: &[u32] = &[1];

pub struct OffersClient {
    front: ClientFacade,
    facade: FacadeCaller,
}

impl OffersClient {
    pub fn new(conn: &Connection) -> Result<Self, ApiError> {
        let (front, facade) = new_client_facade_with_versions(conn, OFFERS_FACADE, SUPPORTED_VERSIONS)?;
        Ok(Self { front, facade })
    }

    /// Publish offers. One result per offer, in order.
    pub async fn offer(&self, offers: Vec<AddApplicationOffer>) -> Result<Vec<ErrorResult>, ApiError> {
        let out: ErrorResults = self
            .facade
            .facade_call("Offer", &AddApplicationOffers { offers })
            .await?;
        Ok(out.results)
    }

    /// Offers matching any of `filters`.
    pub async fn find_application_offers(
        &self,
        filters: Vec<ApplicationOfferFilter>,
    ) -> Result<Vec<ApplicationOffer>, ApiError> {
        let out: FindApplicationOffersResults = self
            .facade
            .facade_call("FindApplicationOffers", &OfferFilters { filters })
            .await?;
        Ok(out.results)
    }

    pub fn best_api_version(&self) -> u32 {
        self.front.best_api_version()
    }

    pub async fn close(&self) {
        self.front.close().await;
    }
}

//! `ApplicationOffers` facade: publish application endpoints and find them.
//!
//! # Data Flow
//! ```text
//! Offer(AddApplicationOffers)          → OfferStore::add per offer → ErrorResults
//! FindApplicationOffers(OfferFilters)  → OfferStore::find          → offers, sorted by URL
//! ```
//!
//! Offers are addressed by URL: `<owner>/<model>.<offer-name>`.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::facade::{CallContext, FacadeSpec};
use crate::rpc::{ErrorCode, RpcError};

pub const OFFERS_FACADE: &str = "ApplicationOffers";

/// Model used when an offer or URL names none.
pub const DEFAULT_MODEL: &str = "default";

/// One endpoint of an offered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    pub name: String,
    pub role: String,
    pub interface: String,
}

/// Parameters for publishing one offer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddApplicationOffer {
    /// Owner of the model; the caller's user name when empty.
    pub owner_name: String,
    pub model_name: String,
    pub offer_name: String,
    pub application_name: String,
    pub application_description: String,
    pub endpoints: Vec<RemoteEndpoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddApplicationOffers {
    pub offers: Vec<AddApplicationOffer>,
}

/// Per-item outcome of a bulk call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResults {
    pub results: Vec<ErrorResult>,
}

/// Matches endpoints; empty fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointFilterTerm {
    pub name: String,
    pub role: String,
    pub interface: String,
}

impl EndpointFilterTerm {
    pub fn matches(&self, endpoint: &RemoteEndpoint) -> bool {
        field_matches(&self.name, &endpoint.name)
            && field_matches(&self.role, &endpoint.role)
            && field_matches(&self.interface, &endpoint.interface)
    }
}

/// Matches offers; empty fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationOfferFilter {
    pub owner_name: String,
    pub model_name: String,
    pub offer_name: String,
    pub application_name: String,
    /// An offer matches if any of its endpoints matches any term.
    pub endpoints: Vec<EndpointFilterTerm>,
}

impl ApplicationOfferFilter {
    /// Build a filter from `[<owner>/]<model>[.<offer>]`.
    pub fn from_url(url: &str) -> Result<Self, RpcError> {
        let (owner, rest) = match url.split_once('/') {
            Some((owner, rest)) => (owner, rest),
            None => ("", url),
        };
        let (model, offer) = match rest.split_once('.') {
            Some((model, offer)) => (model, offer),
            None => (rest, ""),
        };
        if model.is_empty() || rest.contains('/') {
            return Err(RpcError::bad_request(format!(
                "invalid offer URL {url:?}: expected [<owner>/]<model>[.<offer>]"
            )));
        }
        Ok(Self {
            owner_name: owner.to_string(),
            model_name: model.to_string(),
            offer_name: offer.to_string(),
            ..Self::default()
        })
    }

    pub fn matches(&self, offer: &ApplicationOffer) -> bool {
        field_matches(&self.owner_name, &offer.owner_name)
            && field_matches(&self.model_name, &offer.model_name)
            && field_matches(&self.offer_name, &offer.offer_name)
            && field_matches(&self.application_name, &offer.application_name)
            && (self.endpoints.is_empty()
                || self
                    .endpoints
                    .iter()
                    .any(|term| offer.endpoints.iter().any(|ep| term.matches(ep))))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferFilters {
    pub filters: Vec<ApplicationOfferFilter>,
}

/// A published offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationOffer {
    pub offer_url: String,
    pub owner_name: String,
    pub model_name: String,
    pub offer_name: String,
    pub application_name: String,
    pub application_description: String,
    pub endpoints: Vec<RemoteEndpoint>,
    /// Access of the caller that found the offer: "admin" for the owner,
    /// "read" otherwise.
    #[serde(default)]
    pub access: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindApplicationOffersResults {
    pub results: Vec<ApplicationOffer>,
}

fn field_matches(want: &str, have: &str) -> bool {
    want.is_empty() || want == have
}

/// User name behind an entity tag ("user-fred" → "fred").
fn user_name(tag: &str) -> &str {
    tag.strip_prefix("user-").unwrap_or(tag)
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && name.starts_with(|c: char| c.is_ascii_lowercase())
}

/// In-memory offer store, keyed by offer URL.
#[derive(Debug, Default)]
pub struct OfferStore {
    offers: DashMap<String, ApplicationOffer>,
}

impl OfferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an offer on behalf of `caller_tag`.
    pub fn add(&self, caller_tag: &str, args: AddApplicationOffer) -> Result<ApplicationOffer, RpcError> {
        if !valid_name(&args.offer_name) {
            return Err(RpcError::bad_request(format!("invalid offer name {:?}", args.offer_name)));
        }
        if args.application_name.is_empty() {
            return Err(RpcError::bad_request("application name is required"));
        }
        if args.endpoints.is_empty() {
            return Err(RpcError::bad_request(format!(
                "offer {:?} must expose at least one endpoint",
                args.offer_name
            )));
        }

        let owner_name = if args.owner_name.is_empty() {
            user_name(caller_tag).to_string()
        } else {
            args.owner_name
        };
        let model_name = if args.model_name.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            args.model_name
        };
        let offer_url = format!("{owner_name}/{model_name}.{}", args.offer_name);

        match self.offers.entry(offer_url.clone()) {
            Entry::Occupied(_) => Err(RpcError::new(
                ErrorCode::Other("already-exists".to_string()),
                format!("offer {offer_url:?} already exists"),
            )),
            Entry::Vacant(slot) => {
                let offer = ApplicationOffer {
                    offer_url,
                    owner_name,
                    model_name,
                    offer_name: args.offer_name,
                    application_name: args.application_name,
                    application_description: args.application_description,
                    endpoints: args.endpoints,
                    access: String::new(),
                };
                tracing::info!(offer_url = %offer.offer_url, application = %offer.application_name, "Offer added");
                slot.insert(offer.clone());
                Ok(offer)
            }
        }
    }

    /// Offers matching any of `filters` (all offers when there are none),
    /// sorted by URL.
    pub fn find(&self, caller_tag: &str, filters: &[ApplicationOfferFilter]) -> Vec<ApplicationOffer> {
        let caller = user_name(caller_tag);
        let mut found: Vec<ApplicationOffer> = self
            .offers
            .iter()
            .filter(|entry| filters.is_empty() || filters.iter().any(|f| f.matches(entry.value())))
            .map(|entry| {
                let mut offer = entry.value().clone();
                offer.access = if offer.owner_name == caller { "admin" } else { "read" }.to_string();
                offer
            })
            .collect();
        found.sort_by(|a, b| a.offer_url.cmp(&b.offer_url));
        found
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

/// `ApplicationOffers` v1: `Offer` and `FindApplicationOffers`.
pub fn application_offers_v1(store: Arc<OfferStore>) -> FacadeSpec {
    let offer_store = store.clone();
    FacadeSpec::new(OFFERS_FACADE, 1)
        .method("Offer", move |ctx: CallContext, args: AddApplicationOffers| {
            let store = offer_store.clone();
            async move {
                let results = args
                    .offers
                    .into_iter()
                    .map(|offer| ErrorResult {
                        error: store.add(ctx.session.tag(), offer).err(),
                    })
                    .collect();
                Ok::<_, RpcError>(ErrorResults { results })
            }
        })
        .method("FindApplicationOffers", move |ctx: CallContext, args: OfferFilters| {
            let store = store.clone();
            async move {
                let results = store.find(ctx.session.tag(), &args.filters);
                Ok::<_, RpcError>(FindApplicationOffersResults { results })
            }
        })
}

//! Client side of the facade API.
//!
//! # Data Flow
//! ```text
//! Connection::open(address, tag, password)
//!     → Admin.Login → facade versions offered to this session
//! new_client_facade(&conn, "Facade")
//!     → (ClientFacade, FacadeCaller) at the best common version
//! FacadeCaller::facade_call(method, &params)
//!     → Connection::call → typed result or ApiError
//! ```

pub mod connection;
pub mod error;
pub mod facade;
pub mod offers;

pub use connection::Connection;
pub use error::ApiError;
pub use facade::{new_client_facade, new_client_facade_with_versions, ClientFacade, FacadeCaller};
pub use offers::OffersClient;

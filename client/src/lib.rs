//! EVLink client library modules.
//!
//! The crate follows a hexagonal layout: `domain` owns the request/session
//! contract and its ports, `outbound` provides reqwest, GoTrue and filesystem
//! adapters for those ports, and `settings` loads the client configuration.

pub mod domain;
pub mod outbound;
pub mod settings;

pub use domain::{AuthenticatedFetch, NormalizedResult, SafeFetch, SessionStore};

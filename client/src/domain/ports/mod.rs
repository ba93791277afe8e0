//! Domain ports.
//!
//! Driven ports (`HttpTransport`, `IdentityProvider`, `LinkCodeStore`) are
//! implemented by outbound adapters. `CredentialRefresher` is the narrow view
//! of the session store consumed by authenticated requests.

mod credential_refresher;
mod http_transport;
mod identity_provider;
mod link_code_store;
mod macros;

pub(crate) use macros::define_port_error;

#[cfg(test)]
pub use credential_refresher::MockCredentialRefresher;
pub use credential_refresher::{CredentialRefresher, SessionRefreshError};
#[cfg(test)]
pub use http_transport::MockHttpTransport;
pub use http_transport::{HttpTransport, RawResponse, TransportError};
#[cfg(test)]
pub use identity_provider::MockIdentityProvider;
pub use identity_provider::{
    AuthStateReceiver, FixtureIdentityProvider, IdentityProvider, IdentityProviderError,
};
#[cfg(test)]
pub use link_code_store::MockLinkCodeStore;
pub use link_code_store::{
    InMemoryLinkCodeStore, LINK_CODE_KEY, LinkCode, LinkCodeStore, LinkCodeStoreError,
};

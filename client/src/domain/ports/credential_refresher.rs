//! Driving-side view of the session store used by authenticated requests.
//!
//! [`crate::domain::AuthenticatedFetch`] only needs to read the live
//! credential and ask for a new one; keeping that slice behind a trait lets the
//! retry state machine be tested without a full store.

use async_trait::async_trait;

use super::define_port_error;
use super::identity_provider::IdentityProviderError;
use crate::domain::credential::AccessToken;

define_port_error! {
    /// Reasons a refresh produced no new credential.
    pub enum SessionRefreshError {
        /// The provider refused or failed the refresh.
        Provider { source: IdentityProviderError } =>
            "session refresh failed: {source}",
        /// The provider succeeded but returned no session.
        NoSession =>
            "session refresh returned no session",
    }
}

/// Credential access needed by authenticated requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Credential of the live session, read fresh on every call.
    fn current_token(&self) -> Option<AccessToken>;

    /// Obtain a new credential for the signed-in user.
    async fn refresh_token(&self) -> Result<AccessToken, SessionRefreshError>;
}

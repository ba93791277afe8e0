//! Authenticated request execution with a single session-recovery retry.
//!
//! Each call walks a small state machine:
//! `AttemptOne -> (Refreshing -> AttemptTwo)? -> Done`. Transitions are
//! computed by [`AttemptState::advance`], a pure function of the current state
//! and the observed outcome, so the single-retry bound can be checked without
//! a network.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::credential::AccessToken;
use super::ports::CredentialRefresher;
use super::request::{AUTHORIZATION, RequestDescriptor};
use super::result::NormalizedResult;
use super::safe_fetch::{Decoder, RawPayload, SafeFetch, decode_json, decode_raw};

const UNAUTHORIZED: u16 = 401;

/// Position of one authenticated call in its retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// First request with the supplied credential.
    AttemptOne,
    /// Waiting for the session store to mint a new credential.
    Refreshing,
    /// Second and final request with the refreshed credential.
    AttemptTwo,
    /// The last observed result is final.
    Done,
}

/// Outcome observed while in a given [`AttemptState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// An attempt finished; `status` is the error status, `None` on success.
    Response {
        /// Error status of the attempt.
        status: Option<u16>,
    },
    /// The refresh produced a new credential.
    RefreshSucceeded,
    /// The refresh failed or produced no credential.
    RefreshFailed,
}

impl Observation {
    /// Observation for a finished attempt.
    pub fn response<T>(result: &NormalizedResult<T>) -> Self {
        Self::Response {
            status: result.error_status(),
        }
    }
}

impl AttemptState {
    /// Next state after observing `observation`.
    ///
    /// Observations that do not belong to the current state end the call.
    ///
    /// # Examples
    ///
    /// ```
    /// use evlink_client::domain::{AttemptState, Observation};
    ///
    /// let unauthorized = Observation::Response { status: Some(401) };
    /// let state = AttemptState::AttemptOne.advance(unauthorized);
    /// assert_eq!(state, AttemptState::Refreshing);
    /// let state = state.advance(Observation::RefreshSucceeded);
    /// assert_eq!(state, AttemptState::AttemptTwo);
    /// assert_eq!(state.advance(unauthorized), AttemptState::Done);
    /// ```
    #[must_use]
    pub const fn advance(self, observation: Observation) -> Self {
        match (self, observation) {
            (
                Self::AttemptOne,
                Observation::Response {
                    status: Some(UNAUTHORIZED),
                },
            ) => Self::Refreshing,
            (Self::Refreshing, Observation::RefreshSucceeded) => Self::AttemptTwo,
            _ => Self::Done,
        }
    }
}

/// Safe Fetch plus bearer injection and one credential refresh on `401`.
///
/// # Examples
///
/// ```rust,ignore
/// let api = AuthenticatedFetch::new(safe_fetch, store.clone());
/// let status: NormalizedResult<Value> = api
///     .execute_current(&RequestDescriptor::get("/api/user/subscription-status"))
///     .await;
/// ```
#[derive(Clone)]
pub struct AuthenticatedFetch {
    safe_fetch: SafeFetch,
    refresher: Arc<dyn CredentialRefresher>,
}

impl AuthenticatedFetch {
    /// Wrap `safe_fetch`, refreshing credentials through `refresher`.
    pub fn new(safe_fetch: SafeFetch, refresher: Arc<dyn CredentialRefresher>) -> Self {
        Self {
            safe_fetch,
            refresher,
        }
    }

    /// Underlying single-attempt executor, for unauthenticated calls.
    pub fn safe_fetch(&self) -> &SafeFetch {
        &self.safe_fetch
    }

    /// Run `request` with `credential`, retrying once after a refresh on `401`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
        credential: &AccessToken,
    ) -> NormalizedResult<T> {
        self.execute_with(request, Some(credential), decode_json::<T>)
            .await
    }

    /// Like [`Self::execute`], reading the credential from the session store.
    ///
    /// Without a live session the first attempt carries no bearer header;
    /// a `401` then follows the usual refresh path.
    pub async fn execute_current<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> NormalizedResult<T> {
        let credential = self.refresher.current_token();
        self.execute_with(request, credential.as_ref(), decode_json::<T>)
            .await
    }

    /// Raw-bytes variant of [`Self::execute_current`].
    pub async fn execute_current_raw(
        &self,
        request: &RequestDescriptor,
    ) -> NormalizedResult<RawPayload> {
        let credential = self.refresher.current_token();
        self.execute_with(request, credential.as_ref(), decode_raw)
            .await
    }

    /// Run the retry state machine with a custom decoder.
    pub async fn execute_with<T>(
        &self,
        request: &RequestDescriptor,
        credential: Option<&AccessToken>,
        decoder: Decoder<T>,
    ) -> NormalizedResult<T> {
        let mut credential = credential.cloned();
        let mut state = AttemptState::AttemptOne;
        let mut result = self.attempt(request, credential.as_ref(), decoder).await;
        state = state.advance(Observation::response(&result));

        loop {
            debug!(?state, path = request.path(), "authenticated fetch transition");
            match state {
                AttemptState::Done => return result,
                AttemptState::Refreshing => match self.refresher.refresh_token().await {
                    Ok(token) => {
                        credential = Some(token);
                        state = state.advance(Observation::RefreshSucceeded);
                    }
                    Err(error) => {
                        warn!(
                            path = request.path(),
                            reason = error.variant_name(),
                            %error,
                            "credential refresh failed; returning original 401"
                        );
                        state = state.advance(Observation::RefreshFailed);
                    }
                },
                AttemptState::AttemptOne | AttemptState::AttemptTwo => {
                    result = self.attempt(request, credential.as_ref(), decoder).await;
                    state = state.advance(Observation::response(&result));
                }
            }
        }
    }

    async fn attempt<T>(
        &self,
        request: &RequestDescriptor,
        credential: Option<&AccessToken>,
        decoder: Decoder<T>,
    ) -> NormalizedResult<T> {
        let mut prepared = request.clone();
        prepared.remove_header(AUTHORIZATION);
        if let Some(token) = credential {
            prepared.set_header(AUTHORIZATION, token.bearer());
        }
        self.safe_fetch.fetch_with(&prepared, decoder).await
    }
}

//! Post-sign-in reconciliation of the one-shot linking code.
//!
//! A code captured before sign-in is submitted once the user signs in, then
//! deleted. Deletion is tied to [`LinkCodeClaim`]'s `Drop`, so it happens on
//! every path out of [`LinkCodeReconciler::reconcile`], including failed
//! submissions and cancelled futures.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::ports::{LinkCode, LinkCodeStore, LinkCodeStoreError};
use super::request::RequestDescriptor;
use super::result::{ErrorInfo, NormalizedResult};
use super::safe_fetch::SafeFetch;
use super::session::UserId;

/// Backend path consuming a linking code.
pub const LINK_CODE_USE_PATH: &str = "/api/public/access-code/use";
/// Backend path prefix validating a linking code.
pub const LINK_CODE_LOOKUP_PATH: &str = "/api/public/access-code";

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No code was stored.
    NothingPending,
    /// The backend accepted the code.
    Submitted,
    /// The backend call failed; the code was deleted anyway.
    SubmissionFailed(ErrorInfo),
    /// The local store could not be read.
    StoreUnavailable(LinkCodeStoreError),
}

/// Invitation details returned when a code is validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationDetails {
    /// Invited email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Invited display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Scoped ownership of the pending code; dropping the claim deletes it.
struct LinkCodeClaim<'a> {
    store: &'a dyn LinkCodeStore,
    code: LinkCode,
}

impl<'a> LinkCodeClaim<'a> {
    fn acquire(store: &'a dyn LinkCodeStore) -> Result<Option<Self>, LinkCodeStoreError> {
        Ok(store.load()?.map(|code| Self { store, code }))
    }

    fn code(&self) -> &LinkCode {
        &self.code
    }
}

impl Drop for LinkCodeClaim<'_> {
    fn drop(&mut self) {
        match self.store.remove() {
            Ok(()) => debug!("linking code deleted"),
            Err(error) => warn!(%error, "failed to delete linking code"),
        }
    }
}

/// Submits a stored linking code for a newly signed-in user.
#[derive(Clone)]
pub struct LinkCodeReconciler {
    store: Arc<dyn LinkCodeStore>,
    safe_fetch: SafeFetch,
}

impl LinkCodeReconciler {
    /// Reconciler reading codes from `store` and posting through `safe_fetch`.
    pub fn new(store: Arc<dyn LinkCodeStore>, safe_fetch: SafeFetch) -> Self {
        Self { store, safe_fetch }
    }

    /// Validate an invitation code with the backend and keep it for sign-in.
    ///
    /// The code is stored only when the backend recognises it.
    pub async fn capture(&self, raw: &str) -> NormalizedResult<InvitationDetails> {
        let Some(code) = LinkCode::parse(raw) else {
            return NormalizedResult::failure(ErrorInfo::http(400, "linking code is empty"));
        };
        let request = RequestDescriptor::get(format!(
            "{LINK_CODE_LOOKUP_PATH}/{}",
            code.as_str()
        ));
        let result = self.safe_fetch.fetch::<InvitationDetails>(&request).await;
        if result.is_success() {
            if let Err(error) = self.store.save(&code) {
                warn!(%error, "validated linking code could not be stored");
                return NormalizedResult::failure(ErrorInfo::local(format!(
                    "linking code was accepted but could not be saved locally: {error}"
                )));
            }
            info!("linking code stored for the next sign-in");
        }
        result
    }

    /// Submit the pending code for `user_id`, deleting it afterwards.
    pub async fn reconcile(&self, user_id: &UserId) -> ReconcileOutcome {
        let claim = match LinkCodeClaim::acquire(self.store.as_ref()) {
            Ok(Some(claim)) => claim,
            Ok(None) => return ReconcileOutcome::NothingPending,
            Err(error) => {
                warn!(%error, "linking code store unavailable");
                return ReconcileOutcome::StoreUnavailable(error);
            }
        };

        let body = json!({ "code": claim.code().as_str(), "user_id": user_id });
        let request = RequestDescriptor::post(LINK_CODE_USE_PATH).with_body(body.to_string());
        let result = self.safe_fetch.fetch::<Value>(&request).await;
        drop(claim);

        match result.into_result() {
            Ok(_) => {
                info!(user_id = %user_id, "linking code submitted");
                ReconcileOutcome::Submitted
            }
            Err(error) => {
                warn!(user_id = %user_id, %error, "linking code submission failed");
                ReconcileOutcome::SubmissionFailed(error)
            }
        }
    }
}

//! Domain primitives, services and ports for talking to the EVLink backend.
//!
//! Purpose: keep the request contract (normalized results, one-shot
//! credential retry, session lifecycle) free of any concrete HTTP or identity
//! provider. Adapters plug in through [`ports`].
//!
//! Public surface:
//! - Value types: [`AccessToken`], [`UserIdentity`], [`Session`],
//!   [`RequestDescriptor`], [`NormalizedResult`], [`ErrorInfo`].
//! - Services: [`SafeFetch`], [`AuthenticatedFetch`], [`SessionStore`],
//!   [`LinkCodeReconciler`], [`DashboardApi`].

pub mod auth_fetch;
pub mod credential;
pub mod dashboard;
pub mod link_code;
pub mod ports;
pub mod request;
pub mod result;
pub mod safe_fetch;
pub mod session;
pub mod session_store;

pub use self::auth_fetch::{AttemptState, AuthenticatedFetch, Observation};
pub use self::credential::{
    AccessToken, CredentialValidationError, SignInCredentials, SignInValidationError,
};
pub use self::dashboard::{
    CreateCustomerPayload, CsvExport, Customer, DEFAULT_EXPORT_FILENAME, DashboardApi, Invoice,
    OnlineStatus, Subscription, SubscriptionStatus, Tier, UpdateCustomerPayload, UserDetails,
};
pub use self::link_code::{InvitationDetails, LinkCodeReconciler, ReconcileOutcome};
pub use self::request::{
    APPLICATION_JSON, AUTHORIZATION, CONTENT_TYPE, Method, RequestDescriptor, UnsupportedMethod,
};
pub use self::result::{ErrorInfo, FailureKind, NormalizedResult, TRANSPORT_FAILURE_STATUS};
pub use self::safe_fetch::{Decoder, RawPayload, SafeFetch, decode_json, decode_raw};
pub use self::session::{
    ADMIN_ROLE, AuthenticatedSession, Session, SessionEventKind, SessionTransition, UserId,
    UserIdValidationError, UserIdentity,
};
pub use self::session_store::{SessionStore, SessionStoreBuilder, SessionSubscription};

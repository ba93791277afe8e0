//! Integration tests for the reqwest transport and the GoTrue adapter.
//!
//! Each test talks to an in-process Actix server standing in for both the
//! EVLink backend and the identity service.

#[allow(dead_code, reason = "shared harness serves several test binaries")]
#[path = "support/fake_backend.rs"]
mod fake_backend;

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use evlink_client::domain::ports::{IdentityProvider, IdentityProviderError};
use evlink_client::domain::{
    AccessToken, AuthenticatedFetch, DashboardApi, FailureKind, NormalizedResult,
    RequestDescriptor, SafeFetch, SessionEventKind, SessionStore, SignInCredentials,
};
use evlink_client::outbound::http::ReqwestTransport;
use evlink_client::outbound::identity::GoTrueIdentityProvider;
use fake_backend::{ANON_KEY, EMAIL, FakeBackend, PASSWORD, USER_ID, eventually};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use url::Url;

#[fixture]
fn backend() -> FakeBackend {
    FakeBackend::start()
}

fn safe_fetch(base_url: Url, timeout: Duration) -> SafeFetch {
    let transport = ReqwestTransport::new(base_url, timeout).expect("transport");
    SafeFetch::new(Arc::new(transport))
}

fn provider(backend: &FakeBackend) -> Arc<GoTrueIdentityProvider> {
    Arc::new(
        GoTrueIdentityProvider::new(backend.base_url(), ANON_KEY, Duration::from_secs(5))
            .expect("provider"),
    )
}

fn credentials(password: &str) -> SignInCredentials {
    SignInCredentials::try_from_parts(EMAIL, password).expect("credentials")
}

#[rstest]
fn posts_json_and_decodes_the_response(backend: FakeBackend) {
    let fetch = safe_fetch(backend.base_url(), Duration::from_secs(5));
    let request = RequestDescriptor::post("/public/echo")
        .with_json(&json!({ "vehicle": "v-1" }))
        .expect("encode");

    let result: NormalizedResult<Value> = backend.run(fetch.fetch(&request));

    assert_eq!(result.data(), Some(&json!({ "echo": { "vehicle": "v-1" } })));
    let seen = backend.state().requests_to("/public/echo");
    assert_eq!(seen.len(), 1);
    let first = seen.first().expect("recorded request");
    assert_eq!(first.content_type.as_deref(), Some("application/json"));
}

#[rstest]
fn no_content_is_success_without_data(backend: FakeBackend) {
    let fetch = safe_fetch(backend.base_url(), Duration::from_secs(5));
    let result: NormalizedResult<Value> =
        backend.run(fetch.fetch(&RequestDescriptor::get("/public/empty")));
    assert_eq!(result, NormalizedResult::empty());
}

#[rstest]
#[case::status_text("/public/unavailable", 503, "Service Unavailable")]
#[case::detail_list("/public/validation", 422, "field required; too short")]
#[case::detail_string("/nowhere", 401, "Token expired")]
fn non_success_statuses_carry_the_best_message(
    backend: FakeBackend,
    #[case] path: &str,
    #[case] status: u16,
    #[case] message: &str,
) {
    let fetch = safe_fetch(backend.base_url(), Duration::from_secs(5));
    let result: NormalizedResult<Value> = backend.run(fetch.fetch(&RequestDescriptor::get(path)));

    let error = result.error().expect("failure");
    assert_eq!(error.status(), status);
    assert_eq!(error.kind(), FailureKind::Http);
    assert_eq!(error.message(), message);
}

#[rstest]
fn timeouts_report_status_zero(backend: FakeBackend) {
    let fetch = safe_fetch(backend.base_url(), Duration::from_millis(200));
    let result: NormalizedResult<Value> =
        backend.run(fetch.fetch(&RequestDescriptor::get("/public/slow")));

    let error = result.error().expect("failure");
    assert_eq!(error.status(), 0);
    assert_eq!(error.kind(), FailureKind::Transport);
}

#[rstest]
fn unreachable_backends_report_status_zero(backend: FakeBackend) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let base = Url::parse(&format!("http://{addr}")).expect("url");
    let fetch = safe_fetch(base, Duration::from_secs(2));

    let result: NormalizedResult<Value> = backend.run(fetch.fetch(&RequestDescriptor::get("/me")));

    assert_eq!(result.error_status(), Some(0));
}

#[rstest]
fn password_sign_in_emits_a_signed_in_transition(backend: FakeBackend) {
    let provider = provider(&backend);
    let mut events = provider.on_auth_state_change();

    let session = backend
        .run(provider.sign_in_with_password(&credentials(PASSWORD)))
        .expect("sign in");

    assert_eq!(session.token().map(AccessToken::as_str), Some("tok1"));
    let user = session.user().expect("user");
    assert_eq!(user.id.to_string(), USER_ID);
    assert!(user.is_admin);
    let event = events.try_recv().expect("sign-in event");
    assert_eq!(event.kind, SessionEventKind::SignedIn);
    assert_eq!(backend.run(provider.get_session()), Ok(session));
}

#[rstest]
fn wrong_password_is_rejected(backend: FakeBackend) {
    let provider = provider(&backend);
    let outcome = backend.run(provider.sign_in_with_password(&credentials("nope")));
    assert_eq!(
        outcome,
        Err(IdentityProviderError::rejected("Invalid login credentials"))
    );
}

#[rstest]
fn refresh_rotates_tokens_once(backend: FakeBackend) {
    let provider = provider(&backend);
    backend
        .run(provider.sign_in_with_password(&credentials(PASSWORD)))
        .expect("sign in");

    let refreshed = backend.run(provider.refresh_session()).expect("refresh");
    assert_eq!(refreshed.token().map(AccessToken::as_str), Some("tok2"));

    backend.state().revoke_refresh_tokens();
    let outcome = backend.run(provider.refresh_session());
    assert_eq!(
        outcome.map_err(|error| error.variant_name()),
        Err("Rejected")
    );
    assert_eq!(
        backend.state().grants(),
        ["password", "refresh_token", "refresh_token"]
    );
}

#[rstest]
fn sign_out_calls_logout_and_clears_the_session(backend: FakeBackend) {
    let provider = provider(&backend);
    backend
        .run(provider.sign_in_with_password(&credentials(PASSWORD)))
        .expect("sign in");

    backend.run(provider.sign_out()).expect("sign out");

    assert_eq!(backend.state().logouts(), 1);
    assert!(!backend.run(provider.get_session()).expect("session").is_authenticated());
}

#[rstest]
fn dashboard_calls_recover_from_an_expired_token(backend: FakeBackend) {
    let provider = provider(&backend);
    let store = backend.run(SessionStore::builder(provider.clone()).start());
    backend
        .run(provider.sign_in_with_password(&credentials(PASSWORD)))
        .expect("sign in");
    assert!(backend.run(eventually(|| store.current().is_authenticated())));
    backend.state().expire_access_tokens();

    let api = DashboardApi::new(AuthenticatedFetch::new(
        safe_fetch(backend.base_url(), Duration::from_secs(5)),
        store.clone(),
    ));
    let profile = backend.run(api.current_user());

    let user = profile.data().expect("user details");
    assert!(user.is_admin());
    let seen = backend.state().requests_to("/me");
    let bearers: Vec<_> = seen
        .iter()
        .map(|request| request.authorization.as_deref())
        .collect();
    assert_eq!(bearers, [Some("Bearer tok1"), Some("Bearer tok2")]);
    assert_eq!(store.current().token().map(AccessToken::as_str), Some("tok2"));
    backend.run(store.shutdown());
}

#[rstest]
fn forbidden_admin_calls_surface_as_forbidden(backend: FakeBackend) {
    let provider = provider(&backend);
    let store = backend.run(SessionStore::builder(provider.clone()).start());
    backend
        .run(provider.sign_in_with_password(&credentials(PASSWORD)))
        .expect("sign in");
    assert!(backend.run(eventually(|| store.current().is_authenticated())));

    let api = DashboardApi::new(AuthenticatedFetch::new(
        safe_fetch(backend.base_url(), Duration::from_secs(5)),
        store.clone(),
    ));
    let customers = backend.run(api.list_customers());
    assert!(customers.error().is_some_and(|error| error.is_forbidden()));

    let export = backend.run(api.export_charging_sessions(Some("v-1")));
    let export = export.into_data().expect("csv export");
    assert_eq!(export.filename, "sessions_v-1.csv");
    assert_eq!(export.bytes, b"id,kwh\n1,7.2\n");

    let subscription = backend.run(api.subscription_status());
    assert_eq!(subscription.error_status(), Some(404));
    backend.run(store.shutdown());
}

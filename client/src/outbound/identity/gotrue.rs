//! GoTrue (Supabase Auth) identity provider adapter.
//!
//! The adapter keeps the refresh token in process memory only and emits a
//! [`SessionTransition`] to every open event channel whenever its session
//! changes.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::dto::{ErrorDto, IssuedSession, PasswordGrantDto, RefreshGrantDto, TokenResponseDto};
use crate::domain::ports::{AuthStateReceiver, IdentityProvider, IdentityProviderError};
use crate::domain::{AccessToken, Session, SessionTransition, SignInCredentials};
use crate::outbound::http::resolve_url;

const TOKEN_PATH: &str = "/auth/v1/token";
const LOGOUT_PATH: &str = "/auth/v1/logout";
const API_KEY_HEADER: &str = "apikey";

#[derive(Default)]
struct ProviderState {
    session: Session,
    refresh_token: Option<Zeroizing<String>>,
}

/// Identity provider speaking the GoTrue REST API.
pub struct GoTrueIdentityProvider {
    client: Client,
    identity_url: Url,
    anon_key: String,
    state: Mutex<ProviderState>,
    channels: Mutex<Vec<mpsc::UnboundedSender<SessionTransition>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GoTrueIdentityProvider {
    /// Build an adapter for the GoTrue instance at `identity_url`.
    /// ```rust,ignore
    /// let provider = GoTrueIdentityProvider::new(identity_url, anon_key, timeout)?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        identity_url: Url,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            identity_url,
            anon_key: anon_key.into(),
            state: Mutex::new(ProviderState::default()),
            channels: Mutex::new(Vec::new()),
        })
    }

    /// Exchange primary credentials for a session and emit a sign-in event.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityProviderError::Rejected`] for bad credentials and
    /// transport or decode errors otherwise.
    pub async fn sign_in_with_password(
        &self,
        credentials: &SignInCredentials,
    ) -> Result<Session, IdentityProviderError> {
        let grant = PasswordGrantDto {
            email: credentials.email(),
            password: credentials.password(),
        };
        let issued = self.token_grant("password", &grant).await?;
        let session = issued.session.clone();
        self.install(issued);
        info!("signed in with password grant");
        self.emit(&SessionTransition::signed_in(session.clone()));
        Ok(session)
    }

    fn install(&self, issued: IssuedSession) {
        let mut state = lock(&self.state);
        state.session = issued.session;
        state.refresh_token = Some(issued.refresh_token);
    }

    fn emit(&self, transition: &SessionTransition) {
        lock(&self.channels).retain(|sender| sender.send(transition.clone()).is_ok());
    }

    fn endpoint(&self, path: &str, query: &[(String, String)]) -> Url {
        resolve_url(&self.identity_url, path, query)
    }

    fn with_api_key(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, self.anon_key.as_str())
    }

    async fn token_grant<B: Serialize + Sync>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<IssuedSession, IdentityProviderError> {
        let url = self.endpoint(
            TOKEN_PATH,
            &[("grant_type".to_owned(), grant_type.to_owned())],
        );
        let response = self
            .with_api_key(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, bytes.as_ref()));
        }

        let decoded: TokenResponseDto = serde_json::from_slice(bytes.as_ref()).map_err(|error| {
            IdentityProviderError::decode(format!("invalid token payload: {error}"))
        })?;
        decoded
            .into_issued_session()
            .map_err(IdentityProviderError::decode)
    }
}

#[async_trait]
impl IdentityProvider for GoTrueIdentityProvider {
    async fn get_session(&self) -> Result<Session, IdentityProviderError> {
        Ok(lock(&self.state).session.clone())
    }

    async fn refresh_session(&self) -> Result<Session, IdentityProviderError> {
        let refresh_token = lock(&self.state)
            .refresh_token
            .clone()
            .ok_or(IdentityProviderError::NoSession)?;
        let grant = RefreshGrantDto {
            refresh_token: refresh_token.as_str(),
        };
        let issued = self.token_grant("refresh_token", &grant).await?;
        let session = issued.session.clone();
        self.install(issued);
        debug!("refresh token grant succeeded");
        self.emit(&SessionTransition::token_refreshed(session.clone()));
        Ok(session)
    }

    fn on_auth_state_change(&self) -> AuthStateReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.channels).push(sender);
        receiver
    }

    async fn sign_out(&self) -> Result<(), IdentityProviderError> {
        let token: Option<AccessToken> = {
            let mut state = lock(&self.state);
            let token = state.session.token().cloned();
            *state = ProviderState::default();
            token
        };
        let Some(token) = token else {
            return Ok(());
        };
        self.emit(&SessionTransition::signed_out());

        let response = self
            .with_api_key(self.client.post(self.endpoint(LOGOUT_PATH, &[])))
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        let error = map_status_error(status, bytes.as_ref());
        warn!(%error, "remote sign-out failed");
        Err(error)
    }
}

fn map_transport_error(error: reqwest::Error) -> IdentityProviderError {
    IdentityProviderError::transport(error.to_string())
}

fn map_status_error(status: StatusCode, body: &[u8]) -> IdentityProviderError {
    let detail = serde_json::from_slice::<ErrorDto>(body)
        .ok()
        .and_then(ErrorDto::into_message)
        .unwrap_or_else(|| format!("status {}", status.as_u16()));
    if status.is_client_error() {
        IdentityProviderError::rejected(detail)
    } else {
        IdentityProviderError::transport(detail)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for non-network GoTrue mapping helpers.

    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bad_grant(StatusCode::BAD_REQUEST, "Rejected")]
    #[case::unauthorized(StatusCode::UNAUTHORIZED, "Rejected")]
    #[case::server_error(StatusCode::BAD_GATEWAY, "Transport")]
    fn maps_http_statuses_to_provider_errors(#[case] status: StatusCode, #[case] expected: &str) {
        let error = map_status_error(status, br#"{"error_description":"Invalid Refresh Token"}"#);
        assert_eq!(error.variant_name(), expected);
        assert!(error.to_string().contains("Invalid Refresh Token"));
    }

    #[rstest]
    fn falls_back_to_the_status_code() {
        let error = map_status_error(StatusCode::BAD_REQUEST, b"not json");
        assert_eq!(error, IdentityProviderError::rejected("status 400"));
    }

    #[rstest]
    #[tokio::test]
    async fn refresh_without_a_session_reports_no_session() {
        let provider = GoTrueIdentityProvider::new(
            Url::parse("http://127.0.0.1:9").expect("valid url"),
            "anon",
            Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(
            provider.refresh_session().await,
            Err(IdentityProviderError::NoSession)
        );
        assert_eq!(provider.sign_out().await, Ok(()));
    }
}

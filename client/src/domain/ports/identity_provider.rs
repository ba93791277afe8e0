//! Driven port for the external identity provider.
//!
//! Only four capabilities are consumed: reading the provider's session,
//! refreshing it, subscribing to its state changes, and signing out. The
//! provider's internal mechanics stay behind this boundary.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::define_port_error;
use crate::domain::session::{Session, SessionTransition};

/// Receiving half of one provider event channel.
pub type AuthStateReceiver = mpsc::UnboundedReceiver<SessionTransition>;

define_port_error! {
    /// Errors surfaced by the identity provider.
    pub enum IdentityProviderError {
        /// The provider could not be reached.
        Transport { message: String } =>
            "identity provider transport failed: {message}",
        /// The provider refused the operation (for example a revoked refresh token).
        Rejected { message: String } =>
            "identity provider rejected the request: {message}",
        /// There is no session to operate on.
        NoSession =>
            "no active identity provider session",
        /// The provider answered with a payload that could not be decoded.
        Decode { message: String } =>
            "identity provider response decode failed: {message}",
    }
}

/// Port to the identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Session the provider currently holds (empty when signed out).
    async fn get_session(&self) -> Result<Session, IdentityProviderError>;

    /// Mint a new credential for the signed-in user.
    async fn refresh_session(&self) -> Result<Session, IdentityProviderError>;

    /// Open one event channel delivering every provider session transition
    /// in emission order. Dropping the receiver closes the channel.
    fn on_auth_state_change(&self) -> AuthStateReceiver;

    /// End the provider session.
    async fn sign_out(&self) -> Result<(), IdentityProviderError>;
}

/// In-memory identity provider for tests, demos and offline development.
///
/// Refresh outcomes are scripted; when the script is empty a refresh fails
/// with [`IdentityProviderError::Rejected`].
#[derive(Debug, Default)]
pub struct FixtureIdentityProvider {
    session: Mutex<Session>,
    refresh_script: Mutex<VecDeque<Result<Session, IdentityProviderError>>>,
    channels: Mutex<Vec<mpsc::UnboundedSender<SessionTransition>>>,
    channels_opened: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl FixtureIdentityProvider {
    /// Provider holding `session` without emitting an event.
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            ..Self::default()
        }
    }

    /// Queue the outcome of the next refresh call.
    pub fn script_refresh(&self, outcome: Result<Session, IdentityProviderError>) {
        lock(&self.refresh_script).push_back(outcome);
    }

    /// Replace the provider session and emit a sign-in event.
    pub fn sign_in(&self, session: Session) {
        self.emit(&SessionTransition::signed_in(session));
    }

    /// Emit an arbitrary transition to every open channel.
    pub fn emit(&self, transition: &SessionTransition) {
        *lock(&self.session) = transition.session.clone();
        lock(&self.channels).retain(|sender| sender.send(transition.clone()).is_ok());
    }

    /// Number of event channels ever opened.
    pub fn channels_opened(&self) -> usize {
        self.channels_opened.load(Ordering::SeqCst)
    }

    /// Number of channels whose receiver is still alive.
    pub fn open_channels(&self) -> usize {
        let mut channels = lock(&self.channels);
        channels.retain(|sender| !sender.is_closed());
        channels.len()
    }

    /// Number of refresh calls received.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of sign-out calls received.
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl IdentityProvider for FixtureIdentityProvider {
    async fn get_session(&self) -> Result<Session, IdentityProviderError> {
        Ok(lock(&self.session).clone())
    }

    async fn refresh_session(&self) -> Result<Session, IdentityProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = lock(&self.refresh_script).pop_front().unwrap_or_else(|| {
            Err(IdentityProviderError::rejected(
                "no scripted refresh outcome",
            ))
        });
        if let Ok(session) = &outcome {
            *lock(&self.session) = session.clone();
        }
        outcome
    }

    fn on_auth_state_change(&self) -> AuthStateReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels_opened.fetch_add(1, Ordering::SeqCst);
        lock(&self.channels).push(sender);
        receiver
    }

    async fn sign_out(&self) -> Result<(), IdentityProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.session) = Session::Empty;
        Ok(())
    }
}

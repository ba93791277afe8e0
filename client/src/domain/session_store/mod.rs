//! Session store: single owner of the live session.
//!
//! The store mirrors the identity provider through exactly one provider event
//! channel. Listeners registered with [`SessionStore::subscribe`] fan out
//! from that channel, and the store exposes the credential slice consumed by
//! [`crate::domain::AuthenticatedFetch`] through [`CredentialRefresher`].
//!
//! Lifecycle: [`SessionStoreBuilder::start`] seeds state and spawns the event
//! pump; [`SessionStore::shutdown`] (or dropping the store) stops it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::credential::AccessToken;
use super::link_code::LinkCodeReconciler;
use super::ports::{
    AuthStateReceiver, CredentialRefresher, IdentityProvider, IdentityProviderError,
    SessionRefreshError,
};
use super::session::{Session, SessionEventKind, SessionTransition, UserId};

type Listener = Arc<dyn Fn(&SessionTransition) + Send + Sync>;

/// Side effect queued by a fresh sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignInEffect {
    user_id: UserId,
}

struct Shared {
    provider: Arc<dyn IdentityProvider>,
    session: RwLock<Session>,
    generation: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener: AtomicU64,
    apply_gate: Mutex<()>,
    refresh_gate: tokio::sync::Mutex<()>,
    effects: Mutex<Option<mpsc::UnboundedSender<SignInEffect>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn current(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `transition` and notify listeners; `false` when it changed nothing.
    fn apply(&self, transition: &SessionTransition) -> bool {
        let _serial = lock(&self.apply_gate);
        let previous_user = {
            let mut session = self
                .session
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if *session == transition.session {
                debug!(kind = ?transition.kind, "ignoring session event without changes");
                return false;
            }
            let previous_user = session.user().map(|user| user.id.clone());
            *session = transition.session.clone();
            previous_user
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(
            kind = ?transition.kind,
            authenticated = transition.session.is_authenticated(),
            "session transition"
        );

        let fresh_sign_in = (transition.kind == SessionEventKind::SignedIn)
            .then(|| transition.session.user())
            .flatten()
            .filter(|user| previous_user.as_ref() != Some(&user.id));
        if let Some(user) = fresh_sign_in {
            self.queue_sign_in(&user.id);
        }

        let listeners: Vec<Listener> = lock(&self.listeners).values().cloned().collect();
        for listener in listeners {
            listener(transition);
        }
        true
    }

    fn queue_sign_in(&self, user_id: &UserId) {
        if let Some(effects) = lock(&self.effects).as_ref() {
            let effect = SignInEffect {
                user_id: user_id.clone(),
            };
            if effects.send(effect).is_err() {
                warn!("sign-in effect queue closed");
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.listeners).remove(&id);
    }
}

/// Handle returned by [`SessionStore::subscribe`].
///
/// The listener stays registered while the handle lives; dropping the handle
/// or calling [`SessionSubscription::unsubscribe`] removes it.
#[must_use = "dropping the subscription unregisters the listener"]
pub struct SessionSubscription {
    shared: Weak<Shared>,
    id: u64,
}

impl SessionSubscription {
    /// Remove the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for SessionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSubscription").field("id", &self.id).finish()
    }
}

/// Configures and starts a [`SessionStore`].
pub struct SessionStoreBuilder {
    provider: Arc<dyn IdentityProvider>,
    reconciler: Option<LinkCodeReconciler>,
}

impl SessionStoreBuilder {
    /// Submit pending linking codes through `reconciler` on fresh sign-ins.
    #[must_use]
    pub fn with_link_code_reconciler(mut self, reconciler: LinkCodeReconciler) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Open the provider channel, seed the session and spawn the event pump.
    ///
    /// A provider failure while seeding starts the store signed out.
    pub async fn start(self) -> Arc<SessionStore> {
        let events = self.provider.on_auth_state_change();
        let seed = match self.provider.get_session().await {
            Ok(session) => session,
            Err(error) => {
                warn!(%error, "could not read provider session; starting signed out");
                Session::Empty
            }
        };

        let (effects, worker) = match self.reconciler {
            Some(reconciler) => {
                let (sender, receiver) = mpsc::unbounded_channel();
                let worker = tokio::spawn(reconcile_sign_ins(reconciler, receiver));
                (Some(sender), Some(worker))
            }
            None => (None, None),
        };

        let shared = Arc::new(Shared {
            provider: self.provider,
            session: RwLock::new(seed),
            generation: AtomicU64::new(0),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener: AtomicU64::new(0),
            apply_gate: Mutex::new(()),
            refresh_gate: tokio::sync::Mutex::new(()),
            effects: Mutex::new(effects),
        });
        let pump = tokio::spawn(pump_events(Arc::downgrade(&shared), events));
        debug!("session store started");

        Arc::new(SessionStore {
            shared,
            pump: Mutex::new(Some(pump)),
            worker: Mutex::new(worker),
        })
    }
}

async fn pump_events(shared: Weak<Shared>, mut events: AuthStateReceiver) {
    while let Some(transition) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.apply(&transition);
    }
    debug!("provider event channel closed");
}

async fn reconcile_sign_ins(
    reconciler: LinkCodeReconciler,
    mut effects: mpsc::UnboundedReceiver<SignInEffect>,
) {
    while let Some(effect) = effects.recv().await {
        let outcome = reconciler.reconcile(&effect.user_id).await;
        debug!(?outcome, "sign-in reconciliation finished");
    }
}

/// Owner of the live session.
///
/// # Examples
///
/// ```rust,ignore
/// let store = SessionStore::builder(provider).start().await;
/// let _subscription = store.subscribe(|transition| {
///     println!("{:?}", transition.kind);
/// });
/// store.sign_out().await?;
/// assert!(!store.current().is_authenticated());
/// store.shutdown().await;
/// ```
pub struct SessionStore {
    shared: Arc<Shared>,
    pump: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Start configuring a store over `provider`.
    pub fn builder(provider: Arc<dyn IdentityProvider>) -> SessionStoreBuilder {
        SessionStoreBuilder {
            provider,
            reconciler: None,
        }
    }

    /// Live session; never touches the network.
    pub fn current(&self) -> Session {
        self.shared.current()
    }

    /// Register `listener` for every subsequent session transition.
    ///
    /// Listeners run synchronously on the thread applying the transition and
    /// must not block.
    pub fn subscribe<F>(&self, listener: F) -> SessionSubscription
    where
        F: Fn(&SessionTransition) + Send + Sync + 'static,
    {
        let id = self.shared.next_listener.fetch_add(1, Ordering::SeqCst);
        lock(&self.shared.listeners).insert(id, Arc::new(listener));
        SessionSubscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.shared.listeners).len()
    }

    /// Ask the provider for a new credential for the signed-in user.
    ///
    /// Concurrent callers share one provider call: a caller that waited while
    /// another refresh installed a new session receives that session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionRefreshError`] when the provider fails or returns no
    /// session; the live session is left unchanged.
    pub async fn refresh(&self) -> Result<Session, SessionRefreshError> {
        let observed = self.shared.generation.load(Ordering::SeqCst);
        let _gate = self.shared.refresh_gate.lock().await;
        if self.shared.generation.load(Ordering::SeqCst) != observed {
            let current = self.current();
            if current.is_authenticated() {
                debug!("session changed while waiting; reusing it");
                return Ok(current);
            }
        }

        match self.shared.provider.refresh_session().await {
            Ok(session) if session.is_authenticated() => {
                self.shared
                    .apply(&SessionTransition::token_refreshed(session.clone()));
                Ok(session)
            }
            Ok(_) => {
                warn!("session refresh returned no session");
                Err(SessionRefreshError::no_session())
            }
            Err(error) => {
                warn!(reason = error.variant_name(), %error, "session refresh failed");
                Err(SessionRefreshError::provider(error))
            }
        }
    }

    /// Clear the session and notify listeners once.
    ///
    /// Signing out while already signed out does nothing.
    ///
    /// # Errors
    ///
    /// Returns the provider's error after the local session has been cleared.
    pub async fn sign_out(&self) -> Result<(), IdentityProviderError> {
        if !self.current().is_authenticated() {
            debug!("sign-out requested while signed out");
            return Ok(());
        }
        let outcome = self.shared.provider.sign_out().await;
        if let Err(error) = &outcome {
            warn!(%error, "provider sign-out failed; clearing local session");
        }
        self.shared.apply(&SessionTransition::signed_out());
        outcome
    }

    /// Stop the event pump and drain queued sign-in effects.
    pub async fn shutdown(&self) {
        let pump = lock(&self.pump).take();
        if let Some(pump) = pump {
            pump.abort();
            match pump.await {
                Err(error) if !error.is_cancelled() => {
                    warn!(%error, "session event pump failed");
                }
                _ => {}
            }
        }
        lock(&self.shared.effects).take();
        debug!("session store shut down");

        let worker = lock(&self.worker).take();
        let Some(worker) = worker else {
            return;
        };
        if let Err(error) = worker.await {
            warn!(%error, "sign-in reconciliation worker failed");
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
        lock(&self.shared.effects).take();
    }
}

#[async_trait]
impl CredentialRefresher for SessionStore {
    fn current_token(&self) -> Option<AccessToken> {
        self.current().token().cloned()
    }

    async fn refresh_token(&self) -> Result<AccessToken, SessionRefreshError> {
        let session = self.refresh().await?;
        session
            .token()
            .cloned()
            .ok_or_else(SessionRefreshError::no_session)
    }
}

//! Process-wide credential state.

use std::sync::Arc;

use tokio::sync::watch;

/// Snapshot of the authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    /// Whether a user is signed in.
    pub authenticated: bool,
    /// Current short-lived bearer credential.
    pub access_token: Option<String>,
    /// Incremented on every sign-in and sign-out, never on refresh.
    pub session_epoch: u64,
}

impl AuthState {
    /// Whether a realtime connection may be opened with this state.
    #[must_use]
    pub const fn can_connect(&self) -> bool {
        self.authenticated && self.access_token.is_some()
    }

    /// Whether a rejected request may start a refresh.
    ///
    /// A signed-in session may. A signed-out store may only while pristine
    /// (epoch 0), to restore a session from the refresh cookie at startup;
    /// once any sign-in or sign-out happened, signed out is final.
    #[must_use]
    pub const fn may_refresh(&self) -> bool {
        self.authenticated || self.session_epoch == 0
    }
}

/// Holder of the access credential and authentication flag.
///
/// Cloning shares the same state. Observers call [`CredentialStore::subscribe`];
/// only sign-in, sign-out and the [`crate::Authenticator`] write to it.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    state: Arc<watch::Sender<AuthState>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    /// Create an empty, signed-out store.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Current credential, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    /// Whether a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().authenticated
    }

    /// Copy of the full state.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receive every subsequent state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Record a successful login.
    pub fn sign_in(&self, access_token: impl Into<String>) {
        let token = access_token.into();
        self.state.send_modify(|state| {
            state.authenticated = true;
            state.access_token = Some(token);
            state.session_epoch = state.session_epoch.wrapping_add(1);
        });
        tracing::info!("Signed in");
    }

    /// Clear the credential and the authentication flag.
    pub fn sign_out(&self) {
        let changed = self.state.send_if_modified(|state| {
            if !state.authenticated && state.access_token.is_none() {
                return false;
            }
            state.authenticated = false;
            state.access_token = None;
            state.session_epoch = state.session_epoch.wrapping_add(1);
            true
        });
        if changed {
            tracing::info!("Signed out");
        }
    }

    /// Store a refreshed credential, unless the session changed meanwhile.
    ///
    /// Returns `false` when a sign-in or sign-out happened after the refresh
    /// started, or when the store was signed out before; the token is then
    /// discarded.
    pub(crate) fn store_refreshed(&self, access_token: String, epoch: u64) -> bool {
        self.state.send_if_modified(|state| {
            if state.session_epoch != epoch || !state.may_refresh() {
                return false;
            }
            state.authenticated = true;
            state.access_token = Some(access_token);
            true
        })
    }

    /// Current session epoch. It changes on every sign-in and sign-out, so
    /// work started under one epoch can tell that its session is over.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state.borrow().session_epoch
    }

    /// Credential and epoch read together.
    pub(crate) fn credential(&self) -> (Option<String>, u64) {
        let state = self.state.borrow();
        (state.access_token.clone(), state.session_epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_signed_out() {
        let store = CredentialStore::new();
        assert!(!store.is_authenticated());
        assert!(store.access_token().is_none());
        assert!(!store.snapshot().can_connect());
    }

    #[test]
    fn sign_in_and_out() {
        let store = CredentialStore::new();
        store.sign_in("tok");
        assert!(store.is_authenticated());
        assert_eq!(store.access_token().as_deref(), Some("tok"));
        assert!(store.snapshot().can_connect());

        store.sign_out();
        assert!(!store.is_authenticated());
        assert!(store.access_token().is_none());
    }

    #[test]
    fn epoch_moves_on_sign_in_and_out_only() {
        let store = CredentialStore::new();
        store.sign_in("a");
        let epoch = store.epoch();
        assert!(store.store_refreshed("b".into(), epoch));
        assert_eq!(store.epoch(), epoch);
        assert_eq!(store.access_token().as_deref(), Some("b"));

        store.sign_out();
        assert_ne!(store.epoch(), epoch);
    }

    #[test]
    fn refreshed_token_discarded_after_sign_out() {
        let store = CredentialStore::new();
        store.sign_in("a");
        let epoch = store.epoch();
        store.sign_out();

        assert!(!store.store_refreshed("b".into(), epoch));
        assert!(!store.is_authenticated());
        assert!(store.access_token().is_none());
    }

    #[test]
    fn signed_out_store_refuses_refreshed_token() {
        let store = CredentialStore::new();
        assert!(store.snapshot().may_refresh());

        store.sign_in("a");
        store.sign_out();
        let epoch = store.epoch();
        assert!(!store.snapshot().may_refresh());
        assert!(!store.store_refreshed("b".into(), epoch));
        assert!(!store.is_authenticated());
        assert!(store.access_token().is_none());
    }

    #[test]
    fn pristine_store_accepts_cookie_refresh() {
        let store = CredentialStore::new();
        assert!(store.store_refreshed("restored".into(), 0));
        assert!(store.is_authenticated());
        assert_eq!(store.credential(), (Some("restored".to_string()), 0));
    }

    #[test]
    fn sign_out_twice_is_silent() {
        let store = CredentialStore::new();
        let mut rx = store.subscribe();
        store.sign_out();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let store = CredentialStore::new();
        let mut rx = store.subscribe();

        store.sign_in("tok");
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().authenticated);

        store.sign_out();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().authenticated);
    }
}

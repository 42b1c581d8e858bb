//! The session context object.
//!
//! One [`ClientSession`] exists per running client. It owns the credential
//! store and everything bound to it, and is the only place that starts and
//! stops the background notification loop.

use std::sync::Arc;

use hub_core::{ClientConfig, RealtimeConfig};
use hub_notify::{MutationOutcome, NotificationApi, NotificationStore, NotificationSync};
use hub_realtime::{
    ConnectionHandle, ConnectionManager, ConnectionState, ConnectionStats, Connector,
    RealtimeEvent, WsConnector,
};
use hub_session::{Authenticator, CredentialStore, RestTransport, SessionEvent};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::{ClientError, ClientResult};

/// Background work started by a login.
struct SessionTasks {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SessionTasks {
    async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Notification loop ended abnormally");
        }
    }
}

/// Credentials, authenticated REST access, realtime push and notification
/// state for one signed-in user at a time.
///
/// Must be created inside a Tokio runtime.
pub struct ClientSession {
    config: ClientConfig,
    credentials: CredentialStore,
    auth: Authenticator,
    realtime: ConnectionHandle,
    store: NotificationStore,
    sync: NotificationSync,
    tasks: Mutex<Option<SessionTasks>>,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("api_base_url", &self.config.api_base_url.as_str())
            .field("authenticated", &self.credentials.is_authenticated())
            .field("connection", &self.realtime.state())
            .field("unread", &self.store.unread_count())
            .finish_non_exhaustive()
    }
}

impl ClientSession {
    /// Build a session using the WebSocket push channel.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `config` is invalid, or
    /// [`ClientError::Api`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let connector = WsConnector::new(config.realtime_url.clone())
            .with_ping_interval(config.realtime.ping_interval());
        Self::with_connector(config, Arc::new(connector))
    }

    /// Build a session with a custom push channel.
    ///
    /// # Errors
    ///
    /// Same as [`ClientSession::new`].
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> ClientResult<Self> {
        config.validate()?;

        let transport = RestTransport::new(config.api_base_url.clone(), config.request_timeout())?;
        let credentials = CredentialStore::new();
        let auth = Authenticator::new(transport, credentials.clone());
        let realtime =
            ConnectionManager::new(config.realtime.clone(), connector, credentials.subscribe())
                .spawn();
        let store = NotificationStore::new();
        let sync = NotificationSync::new(
            NotificationApi::new(auth.clone()),
            store.clone(),
            config.page_size,
        )
        .with_poll_interval(config.unread_poll_interval());

        info!(
            api = %config.api_base_url,
            realtime = %config.realtime_url,
            page_size = config.page_size,
            "Client session created"
        );

        Ok(Self {
            config,
            credentials,
            auth,
            realtime,
            store,
            sync,
            tasks: Mutex::new(None),
        })
    }

    /// Sign in with `access_token`, load the first notification page and
    /// start the background loop.
    ///
    /// The realtime connection starts as soon as the credential is stored.
    /// Returns the number of notifications loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyCredential`] for an empty token and
    /// [`ClientError::Sync`] if the first page cannot be loaded. A
    /// non-fatal load failure leaves the session signed in with the loop
    /// running; a later resync fills the store.
    #[instrument(skip_all)]
    pub async fn login(&self, access_token: &str) -> ClientResult<usize> {
        if access_token.is_empty() {
            return Err(ClientError::EmptyCredential);
        }
        self.stop_tasks().await;

        // Subscribe before loading so pushes arriving meanwhile are kept.
        let events = self.realtime.subscribe();
        let session_events = self.auth.subscribe();
        self.credentials.sign_in(access_token);

        let loaded = self.sync.load_first_page().await;
        if let Err(e) = &loaded {
            if e.is_session_fatal() {
                warn!(error = %e, "Session ended during login");
                self.sync.reset();
                return Err(e.clone().into());
            }
            warn!(error = %e, "First notification page failed to load");
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(session_loop(
            self.sync.clone(),
            events,
            session_events,
            shutdown_rx,
        ));
        *self.tasks.lock() = Some(SessionTasks { shutdown, task });

        Ok(loaded?)
    }

    /// Sign out: clear the credential, which tears down the realtime
    /// connection, then stop the background loop and forget all
    /// notification state.
    ///
    /// Fetches still in flight are discarded when they return.
    #[instrument(skip_all)]
    pub async fn logout(&self) {
        self.credentials.sign_out();
        self.stop_tasks().await;
        self.sync.reset();
        info!("Client session logged out");
    }

    /// Stop everything. The session cannot be used afterwards.
    pub async fn shutdown(self) {
        self.stop_tasks().await;
        self.realtime.shutdown().await;
        debug!("Client session shut down");
    }

    async fn stop_tasks(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.stop().await;
        }
    }

    /// Mark one notification read.
    ///
    /// # Errors
    ///
    /// See [`NotificationSync::mark_as_read`].
    pub async fn mark_as_read(&self, id: &str) -> ClientResult<MutationOutcome> {
        Ok(self.sync.mark_as_read(id).await?)
    }

    /// Mark every notification read.
    ///
    /// # Errors
    ///
    /// See [`NotificationSync::mark_all_read`].
    pub async fn mark_all_read(&self) -> ClientResult<MutationOutcome> {
        Ok(self.sync.mark_all_read().await?)
    }

    /// Load the next page of older notifications.
    ///
    /// # Errors
    ///
    /// See [`NotificationSync::load_next_page`].
    pub async fn load_more(&self) -> ClientResult<usize> {
        Ok(self.sync.load_next_page().await?)
    }

    /// Leave the `failed` connection state.
    pub fn reconnect(&self) {
        self.realtime.reconnect();
    }

    /// Whether a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    /// Current realtime connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.realtime.state()
    }

    /// Observe realtime connection states.
    #[must_use]
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.realtime.subscribe_state()
    }

    /// Receive realtime events.
    #[must_use]
    pub fn subscribe_realtime(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.realtime.subscribe()
    }

    /// Receive session lifecycle events such as expiry.
    #[must_use]
    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.auth.subscribe()
    }

    /// Realtime connection counters.
    #[must_use]
    pub fn connection_stats(&self) -> ConnectionStats {
        self.realtime.stats()
    }

    /// The notification store.
    #[must_use]
    pub const fn notifications(&self) -> &NotificationStore {
        &self.store
    }

    /// The notification sync protocol.
    #[must_use]
    pub const fn sync(&self) -> &NotificationSync {
        &self.sync
    }

    /// Authenticated access to the rest of the REST API.
    #[must_use]
    pub const fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// The credential store.
    #[must_use]
    pub const fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Realtime settings in use.
    #[must_use]
    pub const fn realtime_config(&self) -> &RealtimeConfig {
        &self.config.realtime
    }
}

/// Runs the sync loop until shutdown, or until the session expires, in
/// which case the sync state and store are reset.
async fn session_loop(
    sync: NotificationSync,
    events: broadcast::Receiver<RealtimeEvent>,
    mut session: broadcast::Receiver<SessionEvent>,
    shutdown: watch::Receiver<bool>,
) {
    let run = sync.clone().run(events, shutdown);
    tokio::pin!(run);
    let mut watching = true;

    loop {
        tokio::select! {
            () = &mut run => break,
            event = session.recv(), if watching => match event {
                Ok(SessionEvent::Expired { reason }) => {
                    warn!(%reason, "Session expired, clearing notifications");
                    sync.reset();
                    break;
                }
                Ok(SessionEvent::Refreshed) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => watching = false,
            },
        }
    }
}

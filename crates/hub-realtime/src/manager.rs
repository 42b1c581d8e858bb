//! Realtime connection manager.
//!
//! A supervisor task owns the single push link and drives the state machine
//!
//! ```text
//! disconnected -> connecting -> connected
//! connected -> reconnecting -> connected
//! reconnecting -> failed                  (budget exhausted)
//! failed -> connecting                    (manual reconnect or new sign-in)
//! any -> disconnected                     (signed out, shutdown)
//! ```
//!
//! Authentication is observed through the credential store's `watch`
//! channel. Losing it cancels whatever the supervisor is doing, including a
//! pending handshake or backoff sleep.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hub_core::{Notification, RealtimeConfig};
use hub_session::AuthState;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Connector, PushLink, StreamError};

const EVENT_CAPACITY: usize = 256;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    #[default]
    Disconnected,
    /// First handshake of an authenticated session.
    Connecting,
    /// A live link is open.
    Connected,
    /// Waiting for or performing a handshake after a drop or failure.
    Reconnecting,
    /// Retry budget exhausted; waits for manual reconnect or a new sign-in.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a live link went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Authentication was lost.
    SignedOut,
    /// The peer closed the link or it errored.
    ConnectionLost(String),
    /// A new credential or manual reconnect replaced the link.
    Replaced,
    /// The manager was shut down.
    Shutdown,
}

/// Events published by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// A link is up. `reconnect` is true when an earlier link of the same
    /// session existed, so pushes may have been missed.
    Connected {
        /// Whether this follows an earlier link.
        reconnect: bool,
    },
    /// The live link went away.
    Disconnected {
        /// Cause.
        reason: DisconnectReason,
    },
    /// The retry budget is exhausted.
    Failed {
        /// Consecutive failed attempts.
        attempts: u32,
    },
    /// A pushed notification.
    Notification(Notification),
}

/// Counters for one manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Handshakes started.
    pub connection_attempts: u64,
    /// Handshakes that produced a link.
    pub successful_connections: u64,
    /// Handshakes that failed or timed out.
    pub failed_connections: u64,
    /// Notifications received over all links.
    pub notifications_received: u64,
    /// Total time spent in backoff (milliseconds).
    pub backoff_time_ms: u64,
}

/// Builds and starts the supervisor.
pub struct ConnectionManager {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    auth: watch::Receiver<AuthState>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager bound to the authentication state in `auth`.
    #[must_use]
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        auth: watch::Receiver<AuthState>,
    ) -> Self {
        Self {
            config,
            connector,
            auth,
        }
    }

    /// Spawn the supervisor task. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(self) -> ConnectionHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (reconnect_tx, reconnect_rx) = watch::channel(0u64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ConnectionStats::default()));

        let supervisor = Supervisor {
            config: self.config,
            connector: self.connector,
            auth: self.auth,
            state: state_tx,
            events: events.clone(),
            reconnect: reconnect_rx,
            shutdown: shutdown_rx,
            stats: Arc::clone(&stats),
            attempts: 0,
            epoch: 0,
            token: None,
            linked_before: false,
        };
        let task = tokio::spawn(supervisor.run());

        ConnectionHandle {
            state: state_rx,
            events,
            reconnect: reconnect_tx,
            shutdown: shutdown_tx,
            stats,
            task,
        }
    }
}

/// Control and observation surface of a running manager.
///
/// Dropping the handle stops the supervisor.
#[derive(Debug)]
pub struct ConnectionHandle {
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<RealtimeEvent>,
    reconnect: watch::Sender<u64>,
    shutdown: watch::Sender<bool>,
    stats: Arc<Mutex<ConnectionStats>>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receive events. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events.subscribe()
    }

    /// Leave `failed` and start a fresh retry budget.
    ///
    /// Only honoured in `failed`; ignored in every other state.
    pub fn reconnect(&self) {
        self.reconnect.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        *self.stats.lock()
    }

    /// Close the link and stop the supervisor.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Realtime supervisor ended abnormally");
        }
    }
}

/// What the supervisor does next.
enum Phase {
    Idle,
    Connect,
    Linked(Box<dyn PushLink>),
    Backoff,
    Failed,
    Stop,
}

/// Classification of an authentication change.
enum AuthChange {
    /// Credential gone or the store dropped.
    SignedOut,
    /// A different sign-in than the one the link was made for.
    NewSession,
    /// Same session, new credential.
    Refreshed,
    Unchanged,
}

enum LinkOutcome {
    Stop,
    Auth(AuthChange),
    Received(Result<Option<Notification>, StreamError>),
}

struct Supervisor {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    auth: watch::Receiver<AuthState>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<RealtimeEvent>,
    reconnect: watch::Receiver<u64>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<ConnectionStats>>,
    /// Consecutive failed handshakes.
    attempts: u32,
    epoch: u64,
    token: Option<String>,
    /// Whether this session already had a link.
    linked_before: bool,
}

impl Supervisor {
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connect => self.connect().await,
                Phase::Linked(link) => self.linked(link).await,
                Phase::Backoff => self.backoff().await,
                Phase::Failed => self.failed().await,
                Phase::Stop => break,
            };
        }
        self.set_state(ConnectionState::Disconnected);
        debug!("Realtime supervisor stopped");
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Realtime state changed");
        }
    }

    fn publish(&self, event: RealtimeEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn start_session(&mut self, auth: &AuthState) {
        self.attempts = 0;
        self.linked_before = false;
        self.epoch = auth.session_epoch;
        self.token.clone_from(&auth.access_token);
    }

    fn classify(&mut self, changed: Result<(), watch::error::RecvError>) -> AuthChange {
        if changed.is_err() {
            return AuthChange::SignedOut;
        }
        let auth = self.auth.borrow_and_update().clone();
        if !auth.can_connect() {
            AuthChange::SignedOut
        } else if auth.session_epoch != self.epoch {
            self.start_session(&auth);
            AuthChange::NewSession
        } else if auth.access_token != self.token {
            self.token = auth.access_token;
            AuthChange::Refreshed
        } else {
            AuthChange::Unchanged
        }
    }

    async fn idle(&mut self) -> Phase {
        self.set_state(ConnectionState::Disconnected);
        loop {
            let auth = self.auth.borrow_and_update().clone();
            if auth.can_connect() {
                self.start_session(&auth);
                return Phase::Connect;
            }
            tokio::select! {
                () = stop_requested(&mut self.shutdown) => return Phase::Stop,
                changed = self.auth.changed() => {
                    if changed.is_err() {
                        return Phase::Stop;
                    }
                }
            }
        }
    }

    async fn connect(&mut self) -> Phase {
        let Some(token) = self.token.clone() else {
            return Phase::Idle;
        };
        let state = if self.linked_before || self.attempts > 0 {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        self.set_state(state);
        self.stats.lock().connection_attempts += 1;

        let timeout = self.config.connect_timeout();
        let connector = Arc::clone(&self.connector);
        let handshake = tokio::time::timeout(timeout, async move { connector.connect(&token).await });
        tokio::pin!(handshake);

        let result = loop {
            tokio::select! {
                () = stop_requested(&mut self.shutdown) => return Phase::Stop,
                changed = self.auth.changed() => match self.classify(changed) {
                    AuthChange::SignedOut => {
                        info!("Signed out during handshake, abandoning connection attempt");
                        return Phase::Idle;
                    }
                    AuthChange::NewSession => return Phase::Connect,
                    AuthChange::Refreshed | AuthChange::Unchanged => {}
                },
                result = &mut handshake => {
                    break result.unwrap_or_else(|_| Err(StreamError::Timeout(timeout)));
                }
            }
        };

        match result {
            Ok(link) => {
                let reconnect = self.linked_before;
                self.attempts = 0;
                self.linked_before = true;
                self.stats.lock().successful_connections += 1;
                info!(reconnect, "Realtime connection established");
                self.publish(RealtimeEvent::Connected { reconnect });
                Phase::Linked(link)
            }
            Err(e) => {
                self.attempts = self.attempts.saturating_add(1);
                self.stats.lock().failed_connections += 1;
                warn!(
                    error = %e,
                    attempt = self.attempts,
                    max_attempts = self.config.backoff.max_attempts,
                    "Realtime connection attempt failed"
                );
                if self.config.backoff.is_exhausted(self.attempts) {
                    Phase::Failed
                } else {
                    Phase::Backoff
                }
            }
        }
    }

    async fn linked(&mut self, mut link: Box<dyn PushLink>) -> Phase {
        self.set_state(ConnectionState::Connected);
        loop {
            let outcome = tokio::select! {
                () = stop_requested(&mut self.shutdown) => LinkOutcome::Stop,
                changed = self.auth.changed() => LinkOutcome::Auth(self.classify(changed)),
                received = link.next_notification() => LinkOutcome::Received(received),
            };

            match outcome {
                LinkOutcome::Stop => {
                    link.close().await;
                    self.publish(RealtimeEvent::Disconnected {
                        reason: DisconnectReason::Shutdown,
                    });
                    return Phase::Stop;
                }
                LinkOutcome::Auth(AuthChange::SignedOut) => {
                    info!("Signed out, closing realtime connection");
                    self.set_state(ConnectionState::Disconnected);
                    link.close().await;
                    self.publish(RealtimeEvent::Disconnected {
                        reason: DisconnectReason::SignedOut,
                    });
                    return Phase::Idle;
                }
                LinkOutcome::Auth(AuthChange::NewSession) => {
                    info!("New sign-in, replacing realtime connection");
                    link.close().await;
                    self.publish(RealtimeEvent::Disconnected {
                        reason: DisconnectReason::Replaced,
                    });
                    return Phase::Connect;
                }
                LinkOutcome::Auth(AuthChange::Refreshed) if self.config.reconnect_on_refresh => {
                    info!("Credential refreshed, reconnecting with the new credential");
                    link.close().await;
                    self.publish(RealtimeEvent::Disconnected {
                        reason: DisconnectReason::Replaced,
                    });
                    return Phase::Connect;
                }
                LinkOutcome::Auth(_) => {}
                LinkOutcome::Received(Ok(Some(notification))) => {
                    self.stats.lock().notifications_received += 1;
                    debug!(id = %notification.id, kind = %notification.kind, "Push notification received");
                    self.publish(RealtimeEvent::Notification(notification));
                }
                LinkOutcome::Received(result) => {
                    let reason = match result {
                        Err(e) => e.to_string(),
                        Ok(_) => "closed by peer".to_string(),
                    };
                    warn!(reason = %reason, "Realtime connection lost");
                    self.publish(RealtimeEvent::Disconnected {
                        reason: DisconnectReason::ConnectionLost(reason),
                    });
                    return Phase::Backoff;
                }
            }
        }
    }

    async fn backoff(&mut self) -> Phase {
        self.set_state(ConnectionState::Reconnecting);
        let delay = self
            .config
            .backoff
            .delay_for_attempt(self.attempts.saturating_sub(1));
        self.stats.lock().backoff_time_ms += duration_ms(delay);
        debug!(delay_ms = duration_ms(delay), attempt = self.attempts, "Waiting before reconnect");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = stop_requested(&mut self.shutdown) => return Phase::Stop,
                changed = self.auth.changed() => match self.classify(changed) {
                    AuthChange::SignedOut => {
                        info!("Signed out, cancelling reconnection");
                        return Phase::Idle;
                    }
                    AuthChange::NewSession => return Phase::Connect,
                    AuthChange::Refreshed | AuthChange::Unchanged => {}
                },
                () = &mut sleep => return Phase::Connect,
            }
        }
    }

    async fn failed(&mut self) -> Phase {
        // Requests made before entering `failed` do not count.
        let _ = self.reconnect.borrow_and_update();
        self.set_state(ConnectionState::Failed);
        warn!(attempts = self.attempts, "Realtime reconnection budget exhausted");
        self.publish(RealtimeEvent::Failed {
            attempts: self.attempts,
        });

        loop {
            tokio::select! {
                () = stop_requested(&mut self.shutdown) => return Phase::Stop,
                changed = self.reconnect.changed() => {
                    if changed.is_err() {
                        return Phase::Stop;
                    }
                    info!("Manual reconnect requested");
                    self.attempts = 0;
                    return Phase::Connect;
                }
                changed = self.auth.changed() => match self.classify(changed) {
                    AuthChange::SignedOut => return Phase::Idle,
                    AuthChange::NewSession => return Phase::Connect,
                    AuthChange::Refreshed | AuthChange::Unchanged => {}
                },
            }
        }
    }
}

/// Resolves once shutdown is requested or the handle is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

//! Request authenticator and single-flight refresh coordinator.
//!
//! Every request carries the current credential. A 401 on a first attempt
//! suspends the request in a FIFO queue; the first queued request also
//! starts the one refresh call. When the refresh settles, the queue is
//! drained in arrival order: each request is replayed once with the new
//! credential, or rejected with the refresh error.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::{ApiError, ApiRequest, ApiResponse, ApiResult, CredentialStore, RestTransport};

const SESSION_EVENT_CAPACITY: usize = 16;

/// Session-level events for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new credential was stored.
    Refreshed,
    /// The refresh failed and the credential was cleared.
    Expired {
        /// Why the refresh failed.
        reason: String,
    },
}

/// A request waiting for the refresh outcome.
struct PendingRequest {
    request: ApiRequest,
    reply: oneshot::Sender<ApiResult<ApiResponse>>,
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    queue: VecDeque<PendingRequest>,
}

struct Inner {
    transport: RestTransport,
    credentials: CredentialStore,
    refresh: Mutex<RefreshState>,
    events: broadcast::Sender<SessionEvent>,
}

/// Attaches credentials to requests and recovers from expired ones.
///
/// Cheap to clone; clones share the refresh state.
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.refresh.lock();
        f.debug_struct("Authenticator")
            .field("base_url", &self.inner.transport.base_url().as_str())
            .field("refreshing", &state.in_flight)
            .field("queued", &state.queue.len())
            .finish_non_exhaustive()
    }
}

enum Recovery {
    /// A refresh completed while the request was in flight.
    Replay { request: ApiRequest, token: String },
    /// Wait for the refresh outcome, starting it if `start`.
    Wait {
        reply: oneshot::Receiver<ApiResult<ApiResponse>>,
        start: bool,
    },
    /// The session the request was sent for is over.
    Reject,
}

impl Authenticator {
    /// Create an authenticator over `transport` and `credentials`.
    #[must_use]
    pub fn new(transport: RestTransport, credentials: CredentialStore) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                credentials,
                refresh: Mutex::new(RefreshState::default()),
                events,
            }),
        }
    }

    /// The credential store this authenticator reads and refreshes.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a refresh call is outstanding.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.lock().in_flight
    }

    /// Number of requests waiting for the refresh outcome.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.refresh.lock().queue.len()
    }

    /// Send `request`, refreshing the credential once if it was rejected.
    ///
    /// Non-auth failures pass through unchanged: any HTTP status other than
    /// 401 is returned as a response.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Http`] on transport failure
    /// - [`ApiError::Unauthorized`] if the replay is rejected again, or the
    ///   session the request was sent for has ended
    /// - [`ApiError::RefreshFailed`] if the refresh failed (session over)
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let (used, epoch) = self.inner.credentials.credential();
        let response = self.inner.transport.send(&request, used.as_deref()).await?;

        if !response.is_unauthorized() {
            return Ok(response);
        }
        if request.is_retry() {
            warn!("Retried request rejected again");
            return Err(ApiError::Unauthorized);
        }

        self.recover(request.into_retry(), used, epoch).await
    }

    /// [`Authenticator::execute`], then require 2xx and decode JSON.
    ///
    /// # Errors
    ///
    /// As [`Authenticator::execute`], plus [`ApiError::Status`] for non-2xx
    /// responses and [`ApiError::Decode`] for unexpected bodies.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        self.execute(request).await?.into_result()?.json()
    }

    async fn recover(
        &self,
        request: ApiRequest,
        used: Option<String>,
        used_epoch: u64,
    ) -> ApiResult<ApiResponse> {
        let recovery = {
            let mut state = self.inner.refresh.lock();
            let current = self.inner.credentials.snapshot();
            match current.access_token {
                _ if current.session_epoch != used_epoch || !current.may_refresh() => {
                    Recovery::Reject
                }
                Some(token) if !state.in_flight && Some(&token) != used.as_ref() => {
                    Recovery::Replay { request, token }
                }
                _ => {
                    let (tx, rx) = oneshot::channel();
                    let start = !state.in_flight;
                    state.in_flight = true;
                    state.queue.push_back(PendingRequest { request, reply: tx });
                    debug!(queued = state.queue.len(), start, "Request queued for refresh");
                    Recovery::Wait { reply: rx, start }
                }
            }
        };

        match recovery {
            Recovery::Replay { request, token } => {
                debug!("Credential changed in flight, replaying without refresh");
                self.inner.replay(&request, &token).await
            }
            Recovery::Wait { reply, start } => self.await_refresh(reply, start).await,
            Recovery::Reject => {
                debug!(epoch = used_epoch, "Rejected request belongs to an ended session");
                Err(ApiError::Unauthorized)
            }
        }
    }

    async fn await_refresh(
        &self,
        reply: oneshot::Receiver<ApiResult<ApiResponse>>,
        start: bool,
    ) -> ApiResult<ApiResponse> {
        if start {
            // Detached so an abandoned caller cannot cancel the refresh.
            tokio::spawn(Arc::clone(&self.inner).refresh_and_drain());
        }
        reply.await.unwrap_or(Err(ApiError::Abandoned))
    }
}

impl Inner {
    async fn replay(&self, request: &ApiRequest, token: &str) -> ApiResult<ApiResponse> {
        let response = self.transport.send(request, Some(token)).await?;
        if response.is_unauthorized() {
            warn!(path = %request.path, "Replayed request rejected");
            return Err(ApiError::Unauthorized);
        }
        Ok(response)
    }

    async fn refresh_and_drain(self: Arc<Self>) {
        let epoch = self.credentials.epoch();
        info!("Refreshing access credential");

        let outcome = match self.transport.refresh().await {
            Ok(token) if self.credentials.store_refreshed(token.clone(), epoch) => Ok(token),
            Ok(_) => Err(ApiError::RefreshFailed(
                "session changed during refresh".into(),
            )),
            Err(e) => Err(ApiError::RefreshFailed(e.to_string())),
        };

        let queue = {
            let mut state = self.refresh.lock();
            state.in_flight = false;
            std::mem::take(&mut state.queue)
        };

        match outcome {
            Ok(token) => {
                info!(queued = queue.len(), "Credential refreshed, replaying queue");
                let _ = self.events.send(SessionEvent::Refreshed);
                for pending in queue {
                    let result = self.replay(&pending.request, &token).await;
                    if pending.reply.send(result).is_err() {
                        debug!(path = %pending.request.path, "Caller gone, replay result dropped");
                    }
                }
            }
            Err(error) => {
                warn!(error = %error, queued = queue.len(), "Credential refresh failed, ending session");
                // A newer session is not ours to end.
                if self.credentials.epoch() == epoch {
                    self.credentials.sign_out();
                    let _ = self.events.send(SessionEvent::Expired {
                        reason: error.to_string(),
                    });
                }
                for pending in queue {
                    let _ = pending.reply.send(Err(error.clone()));
                }
            }
        }
    }
}

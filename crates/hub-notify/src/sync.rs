//! Notification sync protocol.
//!
//! Feeds the [`NotificationStore`] from three unordered sources: paginated
//! history, push events and the user's own read mutations. Read mutations
//! are applied optimistically and de-duplicated per target while one is
//! outstanding. A failed mutation is reported but not rolled back; the next
//! resync or unread-count poll reconciles the local view.
//!
//! Every fetch and poll remembers the credential session epoch it started
//! under. A result that returns after a sign-in or sign-out is discarded, so
//! one user's data never lands in the next user's store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use hub_core::{NotificationPage, ReadAcknowledgement};
use hub_realtime::RealtimeEvent;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::{NotificationApi, NotificationStore, SyncError, SyncResult};

/// Result of a read mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server acknowledged the mutation.
    Applied {
        /// Unread total the server reported, if any.
        server_unread: Option<u64>,
    },
    /// An identical mutation is still outstanding; nothing was sent.
    AlreadyPending,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ReadTarget {
    One(String),
    All,
}

#[derive(Debug, Default)]
struct SyncState {
    loaded_page: u32,
    has_more: bool,
    total: u64,
    pending: HashSet<ReadTarget>,
    /// Bumped whenever a read mutation starts.
    mutations: u64,
    /// Bumped by [`NotificationSync::reset`].
    era: u64,
}

/// Removes its target from the pending set when dropped, including when the
/// caller abandons the mutation future.
struct PendingGuard<'a> {
    state: &'a Mutex<SyncState>,
    target: ReadTarget,
    era: u64,
}

impl<'a> PendingGuard<'a> {
    fn acquire(state: &'a Mutex<SyncState>, target: ReadTarget) -> Option<Self> {
        let mut guarded = state.lock();
        if !guarded.pending.insert(target.clone()) {
            return None;
        }
        guarded.mutations = guarded.mutations.wrapping_add(1);
        let era = guarded.era;
        drop(guarded);
        Some(Self { state, target, era })
    }

    /// Whether this is the only outstanding mutation.
    fn is_alone(&self) -> bool {
        let state = self.state.lock();
        state.era == self.era && state.pending.len() == 1
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        // A reset already cleared this era's targets.
        if state.era == self.era {
            state.pending.remove(&self.target);
        }
    }
}

/// Orchestrates fetches, polling and read mutations for one session.
#[derive(Debug, Clone)]
pub struct NotificationSync {
    api: NotificationApi,
    store: NotificationStore,
    page_size: u32,
    unread_only: bool,
    poll_interval: Duration,
    state: Arc<Mutex<SyncState>>,
    paging: Arc<tokio::sync::Mutex<()>>,
}

impl NotificationSync {
    /// Default interval of the unread-count cross-check.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a sync protocol writing into `store`.
    #[must_use]
    pub fn new(api: NotificationApi, store: NotificationStore, page_size: u32) -> Self {
        Self {
            api,
            store,
            page_size: page_size.max(1),
            unread_only: false,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            state: Arc::new(Mutex::new(SyncState::default())),
            paging: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Fetch only unread notifications.
    #[must_use]
    pub const fn with_unread_only(mut self, unread_only: bool) -> Self {
        self.unread_only = unread_only;
        self
    }

    /// Set the unread-count polling interval used by [`NotificationSync::run`].
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The store this protocol writes into.
    #[must_use]
    pub const fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Whether older history remains on the server.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    /// Last page loaded, 0 before the first load.
    #[must_use]
    pub fn loaded_page(&self) -> u32 {
        self.state.lock().loaded_page
    }

    /// Server-side total from the last page response.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.state.lock().total
    }

    /// Number of outstanding read mutations.
    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Fetch page 1 and replace the store's collection with it.
    ///
    /// Returns the number of notifications received.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the fetch fails and
    /// [`SyncError::SessionChanged`] if the session changed meanwhile; the
    /// store is untouched in both cases.
    #[instrument(skip(self))]
    pub async fn load_first_page(&self) -> SyncResult<usize> {
        let _paging = self.paging.lock().await;
        let epoch = self.api.session_epoch();
        let page = self
            .api
            .fetch_page(1, self.page_size, self.unread_only)
            .await?;
        let received = self.apply_page(epoch, 1, page)?;
        debug!(received, has_more = self.has_more(), "Loaded first notification page");
        Ok(received)
    }

    /// Fetch the page after the last loaded one and append it.
    ///
    /// Returns the number of notifications appended; 0 when there is no
    /// more history.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the fetch fails and
    /// [`SyncError::SessionChanged`] if the session changed meanwhile.
    #[instrument(skip(self))]
    pub async fn load_next_page(&self) -> SyncResult<usize> {
        let _paging = self.paging.lock().await;
        let epoch = self.api.session_epoch();
        let next = {
            let state = self.state.lock();
            if state.loaded_page > 0 && !state.has_more {
                return Ok(0);
            }
            state.loaded_page + 1
        };

        let page = self
            .api
            .fetch_page(next, self.page_size, self.unread_only)
            .await?;
        let appended = self.apply_page(epoch, next, page)?;
        debug!(page = next, appended, "Loaded notification page");
        Ok(appended)
    }

    /// Cross-check the unread counter against the server.
    ///
    /// The server value is applied only if no read mutation is outstanding
    /// and none started while the request was in flight, so it cannot undo
    /// an optimistic read.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the request fails and
    /// [`SyncError::SessionChanged`] if the session changed meanwhile.
    pub async fn refresh_unread_count(&self) -> SyncResult<u64> {
        let epoch = self.api.session_epoch();
        let generation = self.state.lock().mutations;
        let count = self.api.unread_count().await?;

        let state = self.state.lock();
        if self.api.session_epoch() != epoch {
            debug!(count, "Session changed during unread poll, count dropped");
            return Err(SyncError::SessionChanged);
        }
        if state.pending.is_empty() && state.mutations == generation {
            self.apply_server_count(count)?;
        } else {
            debug!(count, "Read mutation overlapped the poll, server count not applied");
        }
        Ok(count)
    }

    /// Mark one notification read, locally first, then on the server.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the server call fails. The local read
    /// flag stays set.
    #[instrument(skip(self))]
    pub async fn mark_as_read(&self, id: &str) -> SyncResult<MutationOutcome> {
        let Some(guard) = PendingGuard::acquire(&self.state, ReadTarget::One(id.to_string()))
        else {
            debug!("Mark-as-read already outstanding");
            return Ok(MutationOutcome::AlreadyPending);
        };

        let epoch = self.api.session_epoch();
        self.store.mark_as_read(id);
        let ack = self.api.mark_as_read(id).await;
        self.finish_mutation(&guard, epoch, ack)
    }

    /// Mark every notification read, locally first, then on the server.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if the server call fails. The local read
    /// flags stay set.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self) -> SyncResult<MutationOutcome> {
        let Some(guard) = PendingGuard::acquire(&self.state, ReadTarget::All) else {
            debug!("Mark-all-read already outstanding");
            return Ok(MutationOutcome::AlreadyPending);
        };

        let epoch = self.api.session_epoch();
        let changed = self.store.mark_all_read();
        debug!(changed, "Marked all notifications read locally");
        let ack = self.api.mark_all_read().await;
        self.finish_mutation(&guard, epoch, ack)
    }

    /// Reload page 1 and the unread counter.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub async fn resync(&self) -> SyncResult<()> {
        self.load_first_page().await?;
        self.refresh_unread_count().await?;
        Ok(())
    }

    /// Forget the session: empty the store, the pagination position and the
    /// outstanding mutations.
    ///
    /// Mutations still in flight finish against the server but no longer
    /// count as pending.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let era = state.era.wrapping_add(1);
        let mutations = state.mutations;
        *state = SyncState {
            mutations,
            era,
            ..SyncState::default()
        };
        self.store.reset();
        debug!("Notification sync reset");
    }

    /// Consume realtime events and poll the unread counter until `shutdown`
    /// turns true or the event channel closes.
    ///
    /// Pushed notifications go straight into the store. A reconnect or a
    /// lagged receiver means pushes may have been lost and triggers a
    /// resync.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<RealtimeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.poll_interval.max(Duration::from_millis(1));
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = stop_requested(&mut shutdown) => break,
                event = events.recv() => match event {
                    Ok(RealtimeEvent::Notification(notification)) => {
                        let id = notification.id.clone();
                        if self.store.add_notification(notification) {
                            debug!(id = %id, "Pushed notification stored");
                        }
                    }
                    Ok(RealtimeEvent::Connected { reconnect: true }) => {
                        info!("Realtime reconnected, resynchronizing notifications");
                        self.resync_logged().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Push events lost, resynchronizing notifications");
                        self.resync_logged().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Realtime event channel closed");
                        break;
                    }
                },
                _ = poll.tick() => {
                    if let Err(e) = self.refresh_unread_count().await {
                        warn!(error = %e, "Unread count poll failed");
                    }
                }
            }
        }
        debug!("Notification sync stopped");
    }

    async fn resync_logged(&self) {
        if let Err(e) = self.resync().await {
            warn!(error = %e, "Notification resync failed");
        }
    }

    fn finish_mutation(
        &self,
        guard: &PendingGuard<'_>,
        epoch: u64,
        ack: Result<ReadAcknowledgement, hub_session::ApiError>,
    ) -> SyncResult<MutationOutcome> {
        match ack {
            Ok(ack) => {
                if let Some(count) = ack.unread_count {
                    if guard.is_alone() && self.api.session_epoch() == epoch {
                        self.apply_server_count(count)?;
                    }
                }
                Ok(MutationOutcome::Applied {
                    server_unread: ack.unread_count,
                })
            }
            Err(e) => {
                warn!(error = %e, "Read mutation failed; keeping optimistic state");
                Err(e.into())
            }
        }
    }

    fn apply_server_count(&self, count: u64) -> SyncResult<()> {
        let count = usize::try_from(count).map_err(|_| SyncError::CountOutOfRange(count))?;
        self.store.update_unread_count(count);
        Ok(())
    }

    /// Write a fetched page into the store if the session that requested
    /// it is still current.
    ///
    /// The epoch check and the writes happen under the sync lock, which
    /// [`NotificationSync::reset`] also takes, so a page can never land
    /// after a logout's reset. Outstanding optimistic reads are re-applied
    /// afterwards.
    fn apply_page(&self, epoch: u64, requested: u32, page: NotificationPage) -> SyncResult<usize> {
        let mut state = self.state.lock();
        if self.api.session_epoch() != epoch {
            debug!(page = requested, "Session changed during fetch, page dropped");
            return Err(SyncError::SessionChanged);
        }

        let applied = if requested == 1 {
            let received = page.notifications.len();
            self.store.initialize(page.notifications);
            received
        } else {
            self.store.extend_history(page.notifications)
        };
        for target in &state.pending {
            match target {
                ReadTarget::One(id) => {
                    self.store.mark_as_read(id);
                }
                ReadTarget::All => {
                    self.store.mark_all_read();
                }
            }
        }

        state.loaded_page = requested;
        state.has_more = requested < page.pagination.total_pages;
        state.total = page.pagination.total;
        Ok(applied)
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

//! Notification state store.
//!
//! Holds the newest-first notification collection and its unread counter.
//! Every operation is synchronous and applied under one write lock, so the
//! counter matches the collection after each call. The one exception is
//! [`NotificationStore::update_unread_count`], whose server-reported value
//! stands only until the next local mutation.

use std::collections::HashSet;
use std::sync::Arc;

use hub_core::Notification;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct State {
    items: Vec<Notification>,
    unread_count: usize,
}

impl State {
    fn derived_unread(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|n| n.id == id)
    }
}

/// Shared notification collection. Clones share state.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    state: Arc<RwLock<State>>,
    unread: Arc<watch::Sender<usize>>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (unread, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(State::default())),
            unread: Arc::new(unread),
        }
    }

    /// Apply `mutate` and recompute the counter from the collection.
    fn mutate<R>(&self, mutate: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.write();
        let result = mutate(&mut state);
        state.unread_count = state.derived_unread();
        self.unread.send_replace(state.unread_count);
        result
    }

    /// Replace the whole collection with a freshly fetched first page.
    ///
    /// Later duplicates of an id within `list` are dropped.
    pub fn initialize(&self, list: Vec<Notification>) {
        let mut seen = HashSet::with_capacity(list.len());
        let items: Vec<Notification> = list
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .collect();
        debug!(count = items.len(), "Notification store initialized");
        self.mutate(|state| state.items = items);
    }

    /// Insert a pushed notification at the head unless its id is known.
    ///
    /// Returns whether it was inserted. A duplicate changes nothing, not
    /// even a server-reported counter.
    pub fn add_notification(&self, notification: Notification) -> bool {
        if self.state.read().position(&notification.id).is_some() {
            trace!(id = %notification.id, "Duplicate notification ignored");
            return false;
        }
        self.mutate(|state| {
            // Re-check under the write lock.
            if state.position(&notification.id).is_some() {
                return false;
            }
            state.items.insert(0, notification);
            true
        })
    }

    /// Append older history, keeping entries already present.
    ///
    /// Returns the number of notifications appended.
    pub fn extend_history(&self, older: Vec<Notification>) -> usize {
        self.mutate(|state| {
            let mut known: HashSet<String> = state.items.iter().map(|n| n.id.clone()).collect();
            let before = state.items.len();
            state
                .items
                .extend(older.into_iter().filter(|n| known.insert(n.id.clone())));
            state.items.len() - before
        })
    }

    /// Mark one notification read. Returns whether its flag changed.
    pub fn mark_as_read(&self, id: &str) -> bool {
        self.mutate(|state| {
            match state.position(id) {
                Some(index) if !state.items[index].read => {
                    state.items[index].read = true;
                    true
                }
                _ => false,
            }
        })
    }

    /// Mark every notification read. Returns how many flags changed.
    pub fn mark_all_read(&self) -> usize {
        self.mutate(|state| {
            let mut changed = 0;
            for n in state.items.iter_mut().filter(|n| !n.read) {
                n.read = true;
                changed += 1;
            }
            changed
        })
    }

    /// Override the counter with a server-reported value.
    pub fn update_unread_count(&self, count: usize) {
        let mut state = self.state.write();
        if state.unread_count != count {
            debug!(
                local = state.unread_count,
                server = count,
                "Unread count corrected from server"
            );
        }
        state.unread_count = count;
        self.unread.send_replace(count);
    }

    /// Clear everything.
    pub fn reset(&self) {
        self.mutate(|state| state.items.clear());
    }

    /// Current unread counter.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.state.read().unread_count
    }

    /// Unread entries actually present in the collection.
    #[must_use]
    pub fn derived_unread_count(&self) -> usize {
        self.state.read().derived_unread()
    }

    /// Copy of the collection, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.read().items.clone()
    }

    /// Look up one notification.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Notification> {
        let state = self.state.read();
        state.position(id).map(|i| state.items[i].clone())
    }

    /// Number of notifications held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// Observe the unread counter.
    #[must_use]
    pub fn subscribe_unread(&self) -> watch::Receiver<usize> {
        self.unread.subscribe()
    }
}

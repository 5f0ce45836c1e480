//! Bounded, deduplicated notification list.
//!
//! [`NotificationStore`] holds the list most-recent-first and keeps the unread
//! count in step with it on every mutation. [`SharedStore`] puts it behind a
//! lock for the host to read and bumps a revision counter after each change.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::model::{Notification, NotificationId};

/// Default list capacity.
pub const DEFAULT_CAPACITY: usize = 50;

/// Ordered notification list with a derived unread count.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    items: VecDeque<Notification>,
    unread: usize,
    capacity: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationStore {
    /// Create an empty store. A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            unread: 0,
            capacity,
        }
    }

    /// Replace the list wholesale, keeping server order.
    ///
    /// Later duplicates of an id are dropped and the list is cut to capacity.
    pub fn seed(&mut self, notifications: Vec<Notification>) {
        let mut seen = HashSet::with_capacity(notifications.len());
        self.items = notifications
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .take(self.capacity)
            .collect();
        self.unread = self.count_unread();
    }

    /// Add one pushed notification at the front.
    ///
    /// An existing entry with the same id is removed first (refresh-and-promote).
    /// The oldest entries are evicted once the list is over capacity.
    pub fn ingest(&mut self, notification: Notification) {
        if let Some(pos) = self.position(&notification.id) {
            if let Some(replaced) = self.items.remove(pos) {
                if !replaced.is_read {
                    self.unread = self.unread.saturating_sub(1);
                }
            }
        }

        if !notification.is_read {
            self.unread += 1;
        }
        self.items.push_front(notification);

        while self.items.len() > self.capacity {
            if let Some(evicted) = self.items.pop_back() {
                if !evicted.is_read {
                    self.unread = self.unread.saturating_sub(1);
                }
            }
        }

        debug_assert_eq!(self.unread, self.count_unread());
    }

    /// Mark one entry read. Returns `false` for unknown or already-read ids.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        let Some(entry) = self.items.iter_mut().find(|n| &n.id == id) else {
            return false;
        };
        if entry.is_read {
            return false;
        }
        entry.is_read = true;
        self.unread = self.unread.saturating_sub(1);
        true
    }

    /// Mark every entry read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let changed = self.unread;
        for entry in &mut self.items {
            entry.is_read = true;
        }
        self.unread = 0;
        changed
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
        self.unread = 0;
    }

    /// Number of unread entries.
    #[must_use]
    pub const fn unread_count(&self) -> usize {
        self.unread
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| &n.id == id)
    }

    /// Entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    /// Copy of the entries, most recent first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }

    fn position(&self, id: &NotificationId) -> Option<usize> {
        self.items.iter().position(|n| &n.id == id)
    }

    fn count_unread(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }
}

/// Store shared between the connection manager and the host.
///
/// The lock is only held inside [`SharedStore::update`] and the read
/// accessors, never across an `.await`.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<NotificationStore>>,
    revision: Arc<watch::Sender<u64>>,
}

impl SharedStore {
    /// Create an empty shared store.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(NotificationStore::new(capacity))),
            revision: Arc::new(revision),
        }
    }

    /// Apply a mutation and notify subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut NotificationStore) -> R) -> R {
        let result = {
            let mut store = self.inner.write();
            f(&mut store)
        };
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
        result
    }

    /// Apply a mutation and notify subscribers only if `changed` accepts its result.
    pub fn update_if<R>(
        &self,
        f: impl FnOnce(&mut NotificationStore) -> R,
        changed: impl FnOnce(&R) -> bool,
    ) -> R {
        let result = {
            let mut store = self.inner.write();
            f(&mut store)
        };
        if changed(&result) {
            self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
        }
        result
    }

    /// Run a read-only closure against the store.
    pub fn read<R>(&self, f: impl FnOnce(&NotificationStore) -> R) -> R {
        f(&self.inner.read())
    }

    /// Copy of the entries, most recent first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Notification> {
        self.inner.read().to_vec()
    }

    /// Number of unread entries.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.inner.read().unread_count()
    }

    /// Current revision; increases after every mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Subscribe to revision changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

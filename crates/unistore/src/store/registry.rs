//! Ordered set of subscription boxes
//!
//! Notification passes walk the registry by index and release the lock
//! between subscribers, so callbacks may subscribe or unsubscribe freely.
//! While a pass is active, removals only mark entries; the marked entries
//! (and those whose subscriber was dropped) are compacted away once the last
//! pass finishes. Order is preserved throughout.

use std::sync::Arc;

use crate::subscriber::SubscriberId;
use crate::subscription_box::SubscriptionBox;

struct Entry<S> {
    subscription: Arc<SubscriptionBox<S>>,
    removed: bool,
}

impl<S> Entry<S> {
    fn new(subscription: Arc<SubscriptionBox<S>>) -> Self {
        Self {
            subscription,
            removed: false,
        }
    }

    fn is_live(&self) -> bool {
        !self.removed && self.subscription.is_alive()
    }
}

/// Result of registering a box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    /// Appended at the end
    Inserted,
    /// Took the place of the subscriber's previous box
    Replaced,
    /// An equivalent box is already registered; it keeps its token
    Unchanged { token: u64 },
}

/// Next step of a notification pass
pub(crate) enum Cursor<S> {
    End,
    Skip,
    Notify(Arc<SubscriptionBox<S>>),
}

pub(crate) struct Registry<S> {
    entries: Vec<Entry<S>>,
    active_passes: usize,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            active_passes: 0,
        }
    }
}

impl<S> Registry<S> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn position_of(&self, id: SubscriberId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| !entry.removed && entry.subscription.subscriber_id() == id)
    }

    pub(crate) fn register(&mut self, candidate: Arc<SubscriptionBox<S>>) -> Registration {
        if self.active_passes == 0 {
            self.compact();
        }

        let Some(index) = self.position_of(candidate.subscriber_id()) else {
            self.entries.push(Entry::new(candidate));
            return Registration::Inserted;
        };

        let existing = &self.entries[index].subscription;
        if existing.is_alive() && existing.is_equivalent(&candidate) {
            return Registration::Unchanged {
                token: existing.token(),
            };
        }

        self.entries[index] = Entry::new(candidate);
        Registration::Replaced
    }

    pub(crate) fn remove_subscriber(&mut self, id: SubscriberId) -> bool {
        match self.position_of(id) {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_token(&mut self, token: u64) -> bool {
        match self
            .entries
            .iter()
            .position(|entry| !entry.removed && entry.subscription.token() == token)
        {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        }
    }

    fn remove_at(&mut self, index: usize) {
        if self.active_passes > 0 {
            self.entries[index].removed = true;
        } else {
            self.entries.remove(index);
        }
    }

    pub(crate) fn contains_token(&self, token: u64) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.is_live() && entry.subscription.token() == token)
    }

    /// Number of registered subscriptions whose subscriber is still alive
    pub(crate) fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_live()).count()
    }

    pub(crate) fn begin_pass(&mut self) {
        self.active_passes += 1;
    }

    pub(crate) fn end_pass(&mut self) {
        self.active_passes = self.active_passes.saturating_sub(1);
        if self.active_passes == 0 {
            self.compact();
        }
    }

    /// Entry at `index` for the pass delivering change number `change`
    pub(crate) fn cursor(&self, index: usize, change: u64) -> Cursor<S> {
        match self.entries.get(index) {
            None => Cursor::End,
            Some(entry) if entry.removed || !entry.subscription.observes(change) => Cursor::Skip,
            Some(entry) => Cursor::Notify(Arc::clone(&entry.subscription)),
        }
    }

    fn compact(&mut self) {
        let before = self.entries.len();
        self.entries.retain(Entry::is_live);
        let pruned = before - self.entries.len();
        if pruned > 0 {
            log::trace!("Pruned {} stale subscription(s)", pruned);
        }
    }
}

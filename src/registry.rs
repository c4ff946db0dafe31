//! Tracks the live change subscriptions backing the mirror, keyed by
//! canonical root-relative path.
//!
//! At most one entry exists per path. Creation is idempotent because
//! child-notification replay can rediscover a subtree that is already
//! subscribed; removal tears down the remote handles along with the
//! entry.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::store::{SubscriptionId, TreeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// One value-changed subscription; fires on value replacement.
    Scalar,
    /// A child-added / child-removed subscription pair.
    Collection,
}

/// A path already subscribed with one shape was asked to take the other.
/// Values are fixed in shape once subscribed; the transition is not
/// reconciled, only reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path} is subscribed as {existing:?} and cannot become {requested:?}")]
pub struct ShapeTransitionError {
    pub path: String,
    pub existing: SubscriptionKind,
    pub requested: SubscriptionKind,
}

#[derive(Debug)]
struct SubscriptionEntry {
    kind: SubscriptionKind,
    handles: Vec<SubscriptionId>,
}

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    entries: BTreeMap<String, SubscriptionEntry>,
}

impl ListenerRegistry {
    pub fn new() -> ListenerRegistry {
        ListenerRegistry {
            entries: BTreeMap::new(),
        }
    }

    pub fn has(&self, path_key: &str) -> bool {
        self.entries.contains_key(path_key)
    }

    pub fn kind(&self, path_key: &str) -> Option<SubscriptionKind> {
        self.entries.get(path_key).map(|entry| entry.kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The registered paths, in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Installs the subscription set for `path_key`, watching the remote
    /// node at `location`. Returns `Ok(false)` without touching the store
    /// when an entry of the same kind already exists.
    pub fn create<S: TreeStore>(
        &mut self,
        store: &S,
        location: &str,
        path_key: &str,
        kind: SubscriptionKind,
    ) -> Result<bool, ShapeTransitionError> {
        if let Some(existing) = self.entries.get(path_key) {
            if existing.kind == kind {
                return Ok(false);
            }

            return Err(ShapeTransitionError {
                path: path_key.to_owned(),
                existing: existing.kind,
                requested: kind,
            });
        }

        let handles = match kind {
            SubscriptionKind::Scalar => vec![store.subscribe_value_changed(location)],
            SubscriptionKind::Collection => vec![
                store.subscribe_child_added(location),
                store.subscribe_child_removed(location),
            ],
        };

        self.entries
            .insert(path_key.to_owned(), SubscriptionEntry { kind, handles });

        Ok(true)
    }

    /// Unsubscribes and drops the entry at `path_key`; no-op if absent.
    pub fn remove<S: TreeStore>(&mut self, store: &S, path_key: &str) {
        if let Some(entry) = self.entries.remove(path_key) {
            for handle in entry.handles {
                store.unsubscribe(handle);
            }
        }
    }

    /// Unsubscribes the entry at `path_key` and every descendant entry.
    /// When a collection node is deleted remotely, only its parent gets a
    /// notification, so the entries under it have to be swept here or
    /// they would leak for the rest of the session.
    pub fn remove_subtree<S: TreeStore>(&mut self, store: &S, path_key: &str) {
        self.remove(store, path_key);

        let prefix = if path_key == "/" {
            "/".to_owned()
        } else {
            format!("{}/", path_key)
        };

        let descendants: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();

        for key in descendants {
            log::trace!("tearing down descendant subscription at {}", key);
            self.remove(store, &key);
        }
    }

    /// Full teardown, used when the session deactivates.
    pub fn clear<S: TreeStore>(&mut self, store: &S) {
        let keys: Vec<String> = self.entries.keys().cloned().collect();

        for key in keys {
            self.remove(store, &key);
        }
    }
}

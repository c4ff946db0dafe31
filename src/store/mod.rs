//! The seam to the remote tree store.
//!
//! Connection, auth, and transport live behind implementations of
//! [`TreeStore`]; this crate only consumes the interface. Change
//! notifications are delivered through a channel rather than callbacks so
//! the session can drain them from one place.

mod memory;

pub use memory::InMemoryStore;

use std::collections::BTreeMap;

use crossbeam_channel::Receiver;
use serde_json::Value;

/// Identifies one live subscription for later teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// A change notification from the remote store. Paths are absolute.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The value at `path` was replaced.
    ValueChanged { path: String, value: Value },
    /// A child `key` appeared under the collection at `path`.
    ChildAdded {
        path: String,
        key: String,
        value: Value,
    },
    /// The child `key` disappeared from the collection at `path`.
    ChildRemoved { path: String, key: String },
}

/// Result of a one-shot read. A node with no data reads as
/// `exists: false`; that is in-band, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub exists: bool,
    pub value: Option<Value>,
    pub has_children: bool,
}

/// The generic interface the sync session uses to talk to the remote
/// hierarchical store. In tests it's backed by [`InMemoryStore`].
pub trait TreeStore {
    fn read(&self, path: &str) -> ReadResult;

    /// Fires [`StoreEvent::ValueChanged`] whenever the value at `path` is
    /// replaced.
    fn subscribe_value_changed(&self, path: &str) -> SubscriptionId;

    /// Fires [`StoreEvent::ChildAdded`] for new children of `path`, and
    /// must enqueue one event per *existing* child before returning.
    /// Subscription discovery recurses through that replay.
    fn subscribe_child_added(&self, path: &str) -> SubscriptionId;

    /// Fires [`StoreEvent::ChildRemoved`] when a child of `path` is
    /// deleted.
    fn subscribe_child_removed(&self, path: &str) -> SubscriptionId;

    /// Stops delivery for the given subscription. Events already enqueued
    /// may still be drained afterwards; consumers discard those as stale.
    fn unsubscribe(&self, subscription: SubscriptionId);

    /// Applies all entries as one atomic update. `None` (or an explicit
    /// JSON null) deletes the node at that path. Fire-and-forget: no
    /// acknowledgment is awaited by this crate.
    fn write_batch(&self, updates: &BTreeMap<String, Option<Value>>);

    fn event_receiver(&self) -> Receiver<StoreEvent>;
}

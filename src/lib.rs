//! Bidirectional mirroring of a remote, tree-structured key-value store.
//!
//! A [`SyncSession`] keeps an in-memory [`MirrorValue`] synchronized with
//! the subtree under one root path of a remote store: change
//! notifications from the store are merged into fresh mirror snapshots,
//! and local mutations are structurally diffed against the previous
//! snapshot and pushed back as one minimal multi-path write.
//!
//! The remote store itself stays behind the [`TreeStore`] trait;
//! [`InMemoryStore`] implements it for tests and embedding.

mod change_processor;
mod diff;
mod message_queue;
mod mirror;
pub mod path;
mod reconcile;
mod registry;
mod store;
mod sync_session;
mod write;

pub use crate::diff::{compute_diff, DiffKind, DiffRecord};
pub use crate::message_queue::MessageQueue;
pub use crate::mirror::MirrorValue;
pub use crate::registry::{ListenerRegistry, ShapeTransitionError, SubscriptionKind};
pub use crate::store::{InMemoryStore, ReadResult, StoreEvent, SubscriptionId, TreeStore};
pub use crate::sync_session::{SyncSession, SyncUpdate};
pub use crate::write::build_write_batch;

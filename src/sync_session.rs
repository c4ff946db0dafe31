//! Contains all of the state for one live mirroring session.

use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;

use crate::{
    change_processor::ChangeProcessor,
    diff::compute_diff,
    message_queue::MessageQueue,
    mirror::MirrorValue,
    path, reconcile,
    registry::ListenerRegistry,
    store::TreeStore,
    write::build_write_batch,
};

/// One applied change to the mirror, published to observers after every
/// accepted remote notification and every local mutation.
#[derive(Debug, Clone)]
pub struct SyncUpdate {
    pub mirror: MirrorValue,
}

/// The session's lifecycle. A root change always flows through one
/// teardown/rebuild transition here; there is no other mutable root
/// state anywhere in the crate.
pub(crate) enum SyncState {
    /// No root is set.
    Inactive,
    /// A root is set but held no data when it was read. The session stays
    /// here until the root changes: structure is only ever discovered
    /// through change notifications seeded from an existing read, so a
    /// root created later is never observed.
    Initializing { root: String },
    /// Mirror populated, listeners live.
    Active(ActiveSync),
}

pub(crate) struct ActiveSync {
    pub(crate) root: String,
    pub(crate) root_segments: Vec<String>,
    pub(crate) mirror: MirrorValue,
    pub(crate) registry: ListenerRegistry,
}

impl ActiveSync {
    /// Splits a notification location into root-relative segments,
    /// recomputed per notification against the root this state was built
    /// for. Locations outside that root come from subscriptions that
    /// predate a root change and resolve to `None`.
    pub(crate) fn relative_segments(&self, location: &str) -> Option<Vec<String>> {
        let segments = path::segments(location);

        if segments.len() < self.root_segments.len()
            || segments[..self.root_segments.len()] != self.root_segments[..]
        {
            return None;
        }

        Some(segments[self.root_segments.len()..].to_vec())
    }
}

/// Keeps a local mirror of the remote subtree under a synchronized root
/// path, merging remote notifications in and pushing local mutations out
/// as minimal path-scoped writes.
pub struct SyncSession<S: TreeStore> {
    store: Arc<S>,

    /// The single serialized update channel: the change processor thread
    /// and local mutators both go through this lock, so no step ever
    /// observes a torn mirror.
    state: Arc<Mutex<SyncState>>,

    /// Applied updates fan out to consumers from here.
    message_queue: Arc<MessageQueue<SyncUpdate>>,

    /// The object responsible for pulling change notifications off the
    /// store and routing them through reconciliation.
    _change_processor: ChangeProcessor,
}

/// Methods that need thread-safety bounds on the store are limited to
/// this block to keep `Send + Sync + 'static` from spreading into
/// everything that handles a session.
impl<S: TreeStore + Send + Sync + 'static> SyncSession<S> {
    pub fn new(store: S) -> Self {
        let store = Arc::new(store);
        let state = Arc::new(Mutex::new(SyncState::Inactive));
        let message_queue = Arc::new(MessageQueue::new());

        let change_processor = ChangeProcessor::start(
            Arc::clone(&store),
            Arc::clone(&state),
            Arc::clone(&message_queue),
        );

        Self {
            store,
            state,
            message_queue,
            _change_processor: change_processor,
        }
    }
}

impl<S: TreeStore> SyncSession<S> {
    /// Points the session at a new synchronized root, or clears it.
    ///
    /// Every live subscription from the previous root is torn down
    /// first. With a new root set, one read decides the rest: data
    /// present seeds the mirror and installs the initial listener set;
    /// no data leaves the session dormant until the root changes again.
    pub fn set_root(&self, root: Option<&str>) {
        let mut state = self.state.lock().unwrap();

        if let SyncState::Active(active) = &mut *state {
            active.registry.clear(self.store.as_ref());
        }
        *state = SyncState::Inactive;

        let root = match root {
            Some(root) => path::normalize(root),
            None => return,
        };

        log::trace!("Initializing sync session at {}", root);

        let node = self.store.read(&root);
        let value = match node.value {
            Some(value) if node.exists => value,
            _ => {
                log::trace!("No data at {}; session stays dormant", root);
                *state = SyncState::Initializing { root };
                return;
            }
        };

        let mut active = ActiveSync {
            root_segments: path::segments(&root),
            root: root.clone(),
            mirror: MirrorValue::from_json(&value),
            registry: ListenerRegistry::new(),
        };

        reconcile::observe(self.store.as_ref(), &mut active, &root);

        let update = SyncUpdate {
            mirror: active.mirror.clone(),
        };
        *state = SyncState::Active(active);
        drop(state);

        self.message_queue.push(update);
    }

    /// The current mirror snapshot, or `None` while uninitialized.
    pub fn mirror(&self) -> Option<MirrorValue> {
        match &*self.state.lock().unwrap() {
            SyncState::Active(active) => Some(active.mirror.clone()),
            _ => None,
        }
    }

    pub fn root(&self) -> Option<String> {
        match &*self.state.lock().unwrap() {
            SyncState::Active(active) => Some(active.root.clone()),
            SyncState::Initializing { root } => Some(root.clone()),
            SyncState::Inactive => None,
        }
    }

    /// Applies a pure transform to the current mirror, pushes the
    /// difference to the remote store as one write batch, and replaces
    /// the local snapshot. Discarded when the session isn't active.
    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(&MirrorValue) -> MirrorValue,
    {
        let mut state = self.state.lock().unwrap();

        let active = match &mut *state {
            SyncState::Active(active) => active,
            _ => {
                log::trace!("Discarding local mutation: session has no active root");
                return;
            }
        };

        let next = updater(&active.mirror);
        let records = compute_diff(&active.mirror, &next);

        if records.is_empty() {
            return;
        }

        log::trace!("Local mutation produced {} diff records", records.len());

        let batch = build_write_batch(&active.root, &records);
        if !batch.is_empty() {
            self.store.write_batch(&batch);
        }

        active.mirror = next;

        let update = SyncUpdate {
            mirror: active.mirror.clone(),
        };
        drop(state);

        self.message_queue.push(update);
    }

    /// Subscribe to applied updates. Mostly useful for reactive bindings
    /// and tests that need to wait out asynchronous reconciliation.
    pub fn subscribe_updates(&self) -> Receiver<SyncUpdate> {
        self.message_queue.subscribe()
    }

    /// The registered subscription paths, sorted; empty unless active.
    pub fn subscribed_paths(&self) -> Vec<String> {
        match &*self.state.lock().unwrap() {
            SyncState::Active(active) => active.registry.paths().map(String::from).collect(),
            _ => Vec::new(),
        }
    }
}

impl<S: TreeStore> Drop for SyncSession<S> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();

        if let SyncState::Active(active) = &mut *state {
            active.registry.clear(self.store.as_ref());
        }

        *state = SyncState::Inactive;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::{
        thread,
        time::{Duration, Instant},
    };

    use maplit::btreemap;
    use serde_json::json;

    use crate::store::InMemoryStore;

    fn wait_until(updates: &Receiver<SyncUpdate>, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);

        while !condition() {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .expect("timed out waiting for sync updates");
            let _ = updates
                .recv_timeout(remaining)
                .expect("timed out waiting for sync updates");
        }
    }

    fn mirror_of(value: serde_json::Value) -> MirrorValue {
        MirrorValue::from_json(&value)
    }

    fn segs(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn initialize_and_follow_remote_value_change() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        store.write_batch(&btreemap! {
            "/app/state/count".to_owned() => Some(json!(1)),
        });

        let remote = store.clone();
        let session = SyncSession::new(store);
        let updates = session.subscribe_updates();

        session.set_root(Some("/app/state"));

        assert_eq!(session.mirror(), Some(mirror_of(json!({"count": 1}))));
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/count"]
        });

        remote.write_batch(&btreemap! {
            "/app/state/count".to_owned() => Some(json!(2)),
        });

        wait_until(&updates, || {
            session.mirror() == Some(mirror_of(json!({"count": 2})))
        });

        // Following a value is not a discovery; no new subscriptions.
        assert_eq!(session.subscribed_paths(), vec!["/", "/count"]);
    }

    #[test]
    fn remote_child_added_extends_mirror_and_listeners() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        store.write_batch(&btreemap! {
            "/app/state/items/a".to_owned() => Some(json!(1)),
        });

        let remote = store.clone();
        let session = SyncSession::new(store);
        let updates = session.subscribe_updates();

        session.set_root(Some("/app/state"));

        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/items", "/items/a"]
        });

        remote.write_batch(&btreemap! {
            "/app/state/items/b".to_owned() => Some(json!(2)),
        });

        wait_until(&updates, || {
            session.mirror() == Some(mirror_of(json!({"items": {"a": 1, "b": 2}})))
        });
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/items", "/items/a", "/items/b"]
        });
    }

    #[test]
    fn local_update_pushes_minimal_write() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        store.write_batch(&btreemap! {
            "/app/state/count".to_owned() => Some(json!(1)),
        });

        let remote = store.clone();
        let session = SyncSession::new(store);
        let updates = session.subscribe_updates();

        session.set_root(Some("/app/state"));
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/count"]
        });

        session.update(|mirror| {
            let mut next = mirror.clone();
            next.set(&segs(&["count"]), MirrorValue::Scalar(json!(2)));
            next
        });

        assert_eq!(session.mirror(), Some(mirror_of(json!({"count": 2}))));
        assert_eq!(remote.read("/app/state/count").value, Some(json!(2)));
    }

    #[test]
    fn local_removal_deletes_remotely_and_tears_down_listener() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        store.write_batch(&btreemap! {
            "/app/state/items/a".to_owned() => Some(json!(1)),
        });

        let remote = store.clone();
        let session = SyncSession::new(store);
        let updates = session.subscribe_updates();

        session.set_root(Some("/app/state"));
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/items", "/items/a"]
        });

        session.update(|mirror| {
            let mut next = mirror.clone();
            next.remove(&segs(&["items", "a"]));
            next
        });

        assert_eq!(session.mirror(), Some(mirror_of(json!({"items": {}}))));
        assert!(!remote.read("/app/state/items/a").exists);
        assert!(remote.read("/app/state/items").exists);

        // The store echoes the deletion back as a child-removed
        // notification, which is what unsubscribes the dead path.
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/items"]
        });
    }

    #[test]
    fn no_op_update_writes_nothing() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        store.write_batch(&btreemap! {
            "/app/state/count".to_owned() => Some(json!(1)),
        });

        let session = SyncSession::new(store);
        session.set_root(Some("/app/state"));

        session.update(|mirror| mirror.clone());

        assert_eq!(session.mirror(), Some(mirror_of(json!({"count": 1}))));
    }

    #[test]
    fn missing_root_stays_dormant() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        let remote = store.clone();
        let session = SyncSession::new(store);

        session.set_root(Some("/app/state"));

        assert_eq!(session.mirror(), None);
        assert_eq!(session.root(), Some("/app/state".to_owned()));
        assert!(session.subscribed_paths().is_empty());

        // Data appearing later is never discovered without a root change.
        remote.write_batch(&btreemap! {
            "/app/state/count".to_owned() => Some(json!(5)),
        });
        thread::sleep(Duration::from_millis(50));

        assert_eq!(session.mirror(), None);

        // Local mutations against an uninitialized session are discarded.
        session.update(|mirror| mirror.clone());
        assert_eq!(session.mirror(), None);
    }

    #[test]
    fn clearing_the_root_deactivates() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        store.write_batch(&btreemap! {
            "/app/state/count".to_owned() => Some(json!(1)),
        });

        let remote = store.clone();
        let session = SyncSession::new(store);
        let updates = session.subscribe_updates();

        session.set_root(Some("/app/state"));
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/count"]
        });

        session.set_root(None);

        assert_eq!(session.mirror(), None);
        assert!(session.subscribed_paths().is_empty());
        assert_eq!(remote.watch_count(), 0);

        // Notifications after teardown leave the session untouched.
        remote.write_batch(&btreemap! {
            "/app/state/count".to_owned() => Some(json!(9)),
        });
        thread::sleep(Duration::from_millis(50));

        assert_eq!(session.mirror(), None);
    }

    #[test]
    fn changing_the_root_rebuilds_against_the_new_subtree() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        store.write_batch(&btreemap! {
            "/first/x".to_owned() => Some(json!(1)),
            "/second/y".to_owned() => Some(json!(2)),
        });

        let remote = store.clone();
        let session = SyncSession::new(store);
        let updates = session.subscribe_updates();

        session.set_root(Some("/first"));
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/x"]
        });

        session.set_root(Some("/second"));

        assert_eq!(session.mirror(), Some(mirror_of(json!({"y": 2}))));
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/y"]
        });

        // Changes under the old root no longer reach the mirror.
        remote.write_batch(&btreemap! {
            "/first/x".to_owned() => Some(json!(99)),
        });
        thread::sleep(Duration::from_millis(50));

        assert_eq!(session.mirror(), Some(mirror_of(json!({"y": 2}))));
    }

    #[test]
    fn dropping_the_session_unsubscribes_everything() {
        let _ = env_logger::try_init();

        let store = InMemoryStore::new();
        store.write_batch(&btreemap! {
            "/app/state/count".to_owned() => Some(json!(1)),
        });

        let remote = store.clone();
        let session = SyncSession::new(store);
        let updates = session.subscribe_updates();

        session.set_root(Some("/app/state"));
        wait_until(&updates, || {
            session.subscribed_paths() == vec!["/", "/count"]
        });

        drop(session);

        assert_eq!(remote.watch_count(), 0);
    }
}

//! An in-memory tree store with live subscriptions.
//!
//! Backs every test in this crate and doubles as a reference
//! implementation of the store contract for embedders. Cloning the store
//! clones a handle to the same shared tree, so a test can hold one handle
//! to play the part of a remote writer while the session owns another.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::{Map, Value};

use crate::path;

use super::{ReadResult, StoreEvent, SubscriptionId, TreeStore};

#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<StoreInner>>,
    receiver: Receiver<StoreEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchKind {
    ValueChanged,
    ChildAdded,
    ChildRemoved,
}

#[derive(Debug)]
struct Watch {
    path: String,
    kind: WatchKind,
}

struct StoreInner {
    root: Value,
    watches: HashMap<SubscriptionId, Watch>,
    next_watch: u64,
    sender: Sender<StoreEvent>,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        let (sender, receiver) = unbounded();

        InMemoryStore {
            inner: Arc::new(Mutex::new(StoreInner {
                root: Value::Object(Map::new()),
                watches: HashMap::new(),
                next_watch: 0,
                sender,
            })),
            receiver,
        }
    }

    /// Number of live subscriptions, across all paths and kinds.
    pub fn watch_count(&self) -> usize {
        self.inner.lock().unwrap().watches.len()
    }

    fn subscribe(&self, path: &str, kind: WatchKind) -> SubscriptionId {
        let mut inner = self.inner.lock().unwrap();
        let path = path::normalize(path);

        let id = SubscriptionId(inner.next_watch);
        inner.next_watch += 1;
        inner.watches.insert(id, Watch { path: path.clone(), kind });

        // Installing a child-added watch replays the children that are
        // already there, in key order, before this call returns.
        if kind == WatchKind::ChildAdded {
            let replay: Vec<(String, Value)> = match value_at(&inner.root, &path::segments(&path))
            {
                Some(Value::Object(map)) => map
                    .iter()
                    .map(|(key, child)| (key.clone(), child.clone()))
                    .collect(),
                _ => Vec::new(),
            };

            for (key, value) in replay {
                inner.emit(StoreEvent::ChildAdded {
                    path: path.clone(),
                    key,
                    value,
                });
            }
        }

        id
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore for InMemoryStore {
    fn read(&self, path: &str) -> ReadResult {
        let inner = self.inner.lock().unwrap();

        match value_at(&inner.root, &path::segments(path)) {
            Some(value) if !value.is_null() => ReadResult {
                exists: true,
                has_children: match value {
                    Value::Object(map) => !map.is_empty(),
                    Value::Array(items) => !items.is_empty(),
                    _ => false,
                },
                value: Some(value.clone()),
            },
            _ => ReadResult {
                exists: false,
                value: None,
                has_children: false,
            },
        }
    }

    fn subscribe_value_changed(&self, path: &str) -> SubscriptionId {
        self.subscribe(path, WatchKind::ValueChanged)
    }

    fn subscribe_child_added(&self, path: &str) -> SubscriptionId {
        self.subscribe(path, WatchKind::ChildAdded)
    }

    fn subscribe_child_removed(&self, path: &str) -> SubscriptionId {
        self.subscribe(path, WatchKind::ChildRemoved)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.watches.remove(&subscription);
    }

    fn write_batch(&self, updates: &std::collections::BTreeMap<String, Option<Value>>) {
        let mut inner = self.inner.lock().unwrap();

        for (target, value) in updates {
            let segments = path::segments(target);

            match value {
                // Writing null is a delete, same as writing nothing.
                None | Some(Value::Null) => inner.apply_delete(&segments),
                Some(value) => inner.apply_set(&segments, value.clone()),
            }
        }
    }

    fn event_receiver(&self) -> Receiver<StoreEvent> {
        self.receiver.clone()
    }
}

impl StoreInner {
    fn apply_set(&mut self, segments: &[String], value: Value) {
        let created_at = first_missing_depth(&self.root, segments);
        set_at(&mut self.root, segments, value);

        match created_at {
            // The node already existed; its value was replaced.
            None => {
                let target = path::join(segments);

                if self.is_watched(WatchKind::ValueChanged, &target) {
                    let value = value_at(&self.root, segments)
                        .cloned()
                        .unwrap_or(Value::Null);
                    self.emit(StoreEvent::ValueChanged {
                        path: target,
                        value,
                    });
                }
            }
            // A new node appeared at `depth`; its parent gained a child.
            Some(depth) => {
                let parent = path::join(&segments[..depth]);

                if self.is_watched(WatchKind::ChildAdded, &parent) {
                    let value = value_at(&self.root, &segments[..=depth])
                        .cloned()
                        .unwrap_or(Value::Null);
                    self.emit(StoreEvent::ChildAdded {
                        path: parent,
                        key: segments[depth].clone(),
                        value,
                    });
                }
            }
        }
    }

    fn apply_delete(&mut self, segments: &[String]) {
        if value_at(&self.root, segments).is_none() {
            return;
        }

        if !delete_at(&mut self.root, segments) {
            return;
        }

        if let Some((key, parent_segments)) = segments.split_last() {
            let parent = path::join(parent_segments);

            if self.is_watched(WatchKind::ChildRemoved, &parent) {
                self.emit(StoreEvent::ChildRemoved {
                    path: parent,
                    key: key.clone(),
                });
            }
        }
    }

    fn is_watched(&self, kind: WatchKind, target: &str) -> bool {
        self.watches
            .values()
            .any(|watch| watch.kind == kind && watch.path == target)
    }

    fn emit(&self, event: StoreEvent) {
        // Send failure means every receiver handle is gone; the events
        // have no audience left and can be dropped.
        let _ = self.sender.send(event);
    }
}

fn value_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = root;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Depth of the first path segment with no node yet, or `None` if the
/// whole path already exists.
fn first_missing_depth(root: &Value, segments: &[String]) -> Option<usize> {
    let mut current = root;

    for (depth, segment) in segments.iter().enumerate() {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(child) => child,
                None => return Some(depth),
            },
            _ => return Some(depth),
        };
    }

    None
}

fn set_at(root: &mut Value, segments: &[String], value: Value) {
    match segments.split_first() {
        None => *root = value,
        Some((head, rest)) => {
            if !root.is_object() {
                *root = Value::Object(Map::new());
            }

            if let Value::Object(map) = root {
                set_at(map.entry(head.clone()).or_insert(Value::Null), rest, value);
            }
        }
    }
}

/// Removes the node at `segments`. Parents left empty are kept; pruning
/// would break the diff/write/read round-trip on emptied containers.
fn delete_at(root: &mut Value, segments: &[String]) -> bool {
    match segments.split_first() {
        None => {
            *root = Value::Object(Map::new());
            true
        }
        Some((head, rest)) => match root {
            Value::Object(map) => {
                if rest.is_empty() {
                    map.remove(head).is_some()
                } else {
                    match map.get_mut(head) {
                        Some(child) => delete_at(child, rest),
                        None => false,
                    }
                }
            }
            _ => false,
        },
    }
}

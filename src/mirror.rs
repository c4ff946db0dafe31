//! The local mirror value: a snapshot of the believed remote state at the
//! synchronized root.
//!
//! Mirrors are replaced wholesale on every reconciliation step (clone the
//! previous snapshot, mutate the clone), so a snapshot handed out to a
//! consumer is never mutated behind its back.

use std::collections::BTreeMap;

use serde_json::Value;

/// A JSON-like tree value with an explicit scalar/container split.
///
/// The remote store represents arrays as keyed mappings with stringified
/// indexes, and so does the mirror: both JSON objects and arrays convert
/// to `Container`. A node is one or the other for its whole subscribed
/// lifetime; shape transitions are rejected at the listener registry.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorValue {
    Scalar(Value),
    Container(BTreeMap<String, MirrorValue>),
}

impl MirrorValue {
    pub fn empty_container() -> MirrorValue {
        MirrorValue::Container(BTreeMap::new())
    }

    pub fn from_json(value: &Value) -> MirrorValue {
        match value {
            Value::Object(map) => MirrorValue::Container(
                map.iter()
                    .map(|(key, child)| (key.clone(), MirrorValue::from_json(child)))
                    .collect(),
            ),
            Value::Array(items) => MirrorValue::Container(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, child)| (index.to_string(), MirrorValue::from_json(child)))
                    .collect(),
            ),
            scalar => MirrorValue::Scalar(scalar.clone()),
        }
    }

    /// Containers serialize as JSON objects, index keys included.
    pub fn to_json(&self) -> Value {
        match self {
            MirrorValue::Scalar(value) => value.clone(),
            MirrorValue::Container(children) => Value::Object(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), child.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, MirrorValue::Container(_))
    }

    pub fn get(&self, path: &[String]) -> Option<&MirrorValue> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => match self {
                MirrorValue::Container(children) => children.get(head)?.get(rest),
                MirrorValue::Scalar(_) => None,
            },
        }
    }

    /// Sets the value at `path`, creating empty containers for any missing
    /// intermediate segment. A scalar sitting where a container is needed
    /// is replaced; this keeps a child notification that outran its
    /// parent's own update from being dropped.
    pub fn set(&mut self, path: &[String], value: MirrorValue) {
        match path.split_first() {
            None => *self = value,
            Some((head, rest)) => {
                if let MirrorValue::Scalar(_) = self {
                    *self = MirrorValue::empty_container();
                }

                if let MirrorValue::Container(children) = self {
                    children
                        .entry(head.clone())
                        .or_insert_with(MirrorValue::empty_container)
                        .set(rest, value);
                }
            }
        }
    }

    /// Removes the value at `path` without creating anything along the
    /// way; a missing intermediate means there is nothing to remove. The
    /// root itself cannot be removed through this method.
    pub fn remove(&mut self, path: &[String]) -> Option<MirrorValue> {
        match path.split_first() {
            None => None,
            Some((head, rest)) => match self {
                MirrorValue::Container(children) => {
                    if rest.is_empty() {
                        children.remove(head)
                    } else {
                        children.get_mut(head)?.remove(rest)
                    }
                }
                MirrorValue::Scalar(_) => None,
            },
        }
    }
}

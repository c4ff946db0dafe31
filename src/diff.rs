//! Defines the algorithm for computing an ordered set of differences
//! between two mirror snapshots.
//!
//! The records drive the remote write batch, so removal of a whole
//! subtree collapses to a single record at the highest removed path
//! rather than one record per leaf.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{mirror::MirrorValue, path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    Created,
    Changed,
    Removed,
}

/// One unit of difference between two snapshots, addressed by canonical
/// root-relative path. `value` is the new value, absent for removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub path: String,
    pub kind: DiffKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Compares two snapshots structurally and yields the differences in a
/// deterministic depth-first order: within each container, `next`'s keys
/// in iteration order first, then the keys only `previous` had. Equal
/// inputs yield no records.
pub fn compute_diff(previous: &MirrorValue, next: &MirrorValue) -> Vec<DiffRecord> {
    let mut records = Vec::new();
    let mut stack = Vec::new();

    diff_value(previous, next, &mut stack, &mut records);

    records
}

fn diff_value(
    previous: &MirrorValue,
    next: &MirrorValue,
    stack: &mut Vec<String>,
    records: &mut Vec<DiffRecord>,
) {
    match (previous, next) {
        (MirrorValue::Scalar(old), MirrorValue::Scalar(new)) => {
            if old != new {
                records.push(record(stack, DiffKind::Changed, Some(new.clone())));
            }
        }

        (MirrorValue::Container(old_children), MirrorValue::Container(new_children)) => {
            for (key, new_child) in new_children {
                stack.push(key.clone());

                match old_children.get(key) {
                    Some(old_child) => diff_value(old_child, new_child, stack, records),
                    None => {
                        records.push(record(stack, DiffKind::Created, Some(new_child.to_json())))
                    }
                }

                stack.pop();
            }

            for key in old_children.keys() {
                if new_children.contains_key(key) {
                    continue;
                }

                stack.push(key.clone());
                records.push(record(stack, DiffKind::Removed, None));
                stack.pop();
            }
        }

        // The node flipped between scalar and container. Subscriptions
        // can't follow that transition, but the write side can: emit the
        // whole new value at this path.
        _ => records.push(record(stack, DiffKind::Changed, Some(next.to_json()))),
    }
}

fn record(stack: &[String], kind: DiffKind, value: Option<Value>) -> DiffRecord {
    DiffRecord {
        path: path::join(stack),
        kind,
        value,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use serde_json::json;

    fn mirror(value: Value) -> MirrorValue {
        MirrorValue::from_json(&value)
    }

    #[test]
    fn equal_snapshots_diff_to_nothing() {
        let value = mirror(json!({"items": {"a": 1, "b": [1, 2]}, "count": 3}));

        assert_eq!(compute_diff(&value, &value), Vec::new());
    }

    #[test]
    fn changed_scalar() {
        let records = compute_diff(&mirror(json!({"count": 1})), &mirror(json!({"count": 2})));

        assert_eq!(
            records,
            vec![DiffRecord {
                path: "/count".to_owned(),
                kind: DiffKind::Changed,
                value: Some(json!(2)),
            }]
        );
    }

    #[test]
    fn removed_leaf() {
        let records = compute_diff(
            &mirror(json!({"items": {"a": 1}})),
            &mirror(json!({"items": {}})),
        );

        assert_eq!(
            records,
            vec![DiffRecord {
                path: "/items/a".to_owned(),
                kind: DiffKind::Removed,
                value: None,
            }]
        );
    }

    #[test]
    fn created_subtree_is_one_record() {
        let records = compute_diff(
            &mirror(json!({})),
            &mirror(json!({"items": {"a": 1, "b": 2}})),
        );

        assert_eq!(
            records,
            vec![DiffRecord {
                path: "/items".to_owned(),
                kind: DiffKind::Created,
                value: Some(json!({"a": 1, "b": 2})),
            }]
        );
    }

    #[test]
    fn removed_subtree_is_one_record() {
        let records = compute_diff(
            &mirror(json!({"items": {"a": 1, "b": 2}, "count": 1})),
            &mirror(json!({"count": 1})),
        );

        assert_eq!(
            records,
            vec![DiffRecord {
                path: "/items".to_owned(),
                kind: DiffKind::Removed,
                value: None,
            }]
        );
    }

    #[test]
    fn shape_flip_emits_whole_value() {
        let records = compute_diff(
            &mirror(json!({"node": 5})),
            &mirror(json!({"node": {"a": 1}})),
        );

        assert_eq!(
            records,
            vec![DiffRecord {
                path: "/node".to_owned(),
                kind: DiffKind::Changed,
                value: Some(json!({"a": 1})),
            }]
        );
    }

    #[test]
    fn root_scalar_change() {
        let records = compute_diff(&mirror(json!(1)), &mirror(json!(2)));

        assert_eq!(
            records,
            vec![DiffRecord {
                path: "/".to_owned(),
                kind: DiffKind::Changed,
                value: Some(json!(2)),
            }]
        );
    }

    #[test]
    fn mixed_changes_come_out_in_stable_order() {
        let previous = mirror(json!({"a": 1, "b": {"x": 1}, "c": 3}));
        let next = mirror(json!({"a": 2, "b": {"y": 2}, "d": 4}));

        let first = compute_diff(&previous, &next);
        let second = compute_diff(&previous, &next);
        assert_eq!(first, second);

        let paths: Vec<&str> = first.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b/y", "/b/x", "/d", "/c"]);
    }
}

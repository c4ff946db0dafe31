//! Turns a sequence of diff records into one multi-path remote write.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{
    diff::{DiffKind, DiffRecord},
    path,
};

/// Builds the absolute-path update map for a single atomic write request.
/// Removals map to `None`, which the store contract treats as
/// delete-at-path. An empty diff builds an empty batch, and the session
/// skips the remote call entirely for it.
pub fn build_write_batch(
    root: &str,
    records: &[DiffRecord],
) -> BTreeMap<String, Option<Value>> {
    let root_segments = path::segments(root);
    let mut batch = BTreeMap::new();

    for record in records {
        let relative = path::segments(&record.path);

        if relative.is_empty() && record.kind == DiffKind::Removed {
            // Removing the entire synchronized root has no defined write
            // semantics; refuse to guess at delete-everything.
            log::warn!("discarding removal record addressed at the sync root {}", root);
            continue;
        }

        let mut absolute = root_segments.clone();
        absolute.extend(relative);

        let value = match record.kind {
            DiffKind::Removed => None,
            DiffKind::Created | DiffKind::Changed => record.value.clone(),
        };

        batch.insert(path::join(&absolute), value);
    }

    batch
}

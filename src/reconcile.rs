//! Applies remote change notifications to the active session state and
//! discovers subscriptions for newly observed substructure.
//!
//! Every accepted notification produces a fresh mirror snapshot by
//! cloning the previous one and mutating the clone. Notifications whose
//! path is outside the current root or no longer covered by a
//! subscription entry are stale and get discarded without effect.

use crate::{
    mirror::MirrorValue,
    path,
    registry::SubscriptionKind,
    store::{StoreEvent, TreeStore},
    sync_session::ActiveSync,
};

/// Routes one store event into the mirror. Returns the new snapshot when
/// the event was accepted, `None` when it was discarded as stale.
pub(crate) fn apply_store_event<S: TreeStore>(
    store: &S,
    active: &mut ActiveSync,
    event: &StoreEvent,
) -> Option<MirrorValue> {
    match event {
        StoreEvent::ValueChanged { path: location, value } => {
            let relative = match active.relative_segments(location) {
                Some(relative) => relative,
                None => return discard("outside the current root", location),
            };

            if !active.registry.has(&path::join(&relative)) {
                return discard("no live subscription", location);
            }

            let mut next = active.mirror.clone();
            next.set(&relative, MirrorValue::from_json(value));
            active.mirror = next;

            Some(active.mirror.clone())
        }

        StoreEvent::ChildAdded {
            path: parent_location,
            key,
            value,
        } => {
            let parent = match active.relative_segments(parent_location) {
                Some(parent) => parent,
                None => return discard("outside the current root", parent_location),
            };

            if !active.registry.has(&path::join(&parent)) {
                return discard("no live subscription", parent_location);
            }

            let mut relative = parent;
            relative.push(key.clone());

            let mut next = active.mirror.clone();
            next.set(&relative, MirrorValue::from_json(value));
            active.mirror = next;

            // The child may carry structure of its own; subscribe it and,
            // through child-added replay, everything below it.
            let mut location = path::segments(parent_location);
            location.push(key.clone());
            observe(store, active, &path::join(&location));

            Some(active.mirror.clone())
        }

        StoreEvent::ChildRemoved {
            path: parent_location,
            key,
        } => {
            let parent = match active.relative_segments(parent_location) {
                Some(parent) => parent,
                None => return discard("outside the current root", parent_location),
            };

            if !active.registry.has(&path::join(&parent)) {
                return discard("no live subscription", parent_location);
            }

            let mut relative = parent;
            relative.push(key.clone());

            let mut next = active.mirror.clone();
            next.remove(&relative);
            active.mirror = next;

            active.registry.remove_subtree(store, &path::join(&relative));

            Some(active.mirror.clone())
        }
    }
}

/// Subscription discovery for the remote node at `location`: a node with
/// no data is never subscribed, a node with children gets a collection
/// entry, anything else a scalar entry. Already-registered paths are a
/// no-op inside the registry, which is what makes duplicate discovery
/// triggers harmless.
pub(crate) fn observe<S: TreeStore>(store: &S, active: &mut ActiveSync, location: &str) {
    let node = store.read(location);

    if !node.exists {
        return;
    }

    let relative = match active.relative_segments(location) {
        Some(relative) => relative,
        None => return,
    };

    let kind = if node.has_children {
        SubscriptionKind::Collection
    } else {
        SubscriptionKind::Scalar
    };

    match active.registry.create(store, location, &path::join(&relative), kind) {
        Ok(true) => log::trace!("subscribed {:?} listener at {}", kind, location),
        Ok(false) => {}
        Err(err) => log::warn!("skipping subscription: {}", err),
    }
}

fn discard(reason: &str, location: &str) -> Option<MirrorValue> {
    log::trace!("discarding notification for {}: {}", location, reason);
    None
}

//! Identifier collision repair.
//!
//! Live hands out track ids and automation/modulation target ids from
//! per-set counters, so two branches that both add something routinely pick
//! the same numbers. After combining them the duplicates are renumbered
//! above the largest id already in use.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::errors::DocumentError;
use crate::model::schema::{self, parse_attr};
use crate::model::Document;
use crate::xml::NodeId;

/// Give every duplicate track id a fresh id. The first occurrence keeps its
/// id; later ones get `max + 1`, `max + 2`, ... in document order.
///
/// Returns `(old, new)` for each reassignment.
pub fn resolve_track_id_collisions(doc: &mut Document) -> Vec<(i64, i64)> {
    let ids = doc.track_ids();
    let Some(&max) = ids.iter().max() else {
        return Vec::new();
    };

    let mut claimed = HashSet::new();
    let mut next = max + 1;
    let mut reassigned = Vec::new();
    for (index, id) in ids.into_iter().enumerate() {
        if claimed.insert(id) {
            continue;
        }
        doc.set_track_id(index, next);
        claimed.insert(next);
        debug!(old = id, new = next, "reassigned duplicate track id");
        reassigned.push((id, next));
        next += 1;
    }

    if !reassigned.is_empty() {
        info!(count = reassigned.len(), "resolved track id collisions");
    }
    reassigned
}

/// Renumber duplicate ids on collidable nodes across the whole document.
/// Traversal is depth-first pre-order; the first occurrence keeps its id.
///
/// Returns `(old, new)` for each reassignment.
pub fn resolve_global_id_collisions(
    doc: &mut Document,
) -> Result<Vec<(i64, i64)>, DocumentError> {
    let targets = collidable_ids(doc)?;
    let Some(max) = targets.iter().map(|&(_, id)| id).max() else {
        return Ok(Vec::new());
    };

    let mut claimed = HashSet::new();
    let mut duplicates = Vec::new();
    for (node, id) in targets {
        if !claimed.insert(id) {
            duplicates.push((node, id));
        }
    }

    let tree = doc.tree_mut();
    let mut next = max + 1;
    let mut reassigned = Vec::with_capacity(duplicates.len());
    for (node, id) in duplicates {
        tree.set_attr(node, schema::ID, next.to_string());
        reassigned.push((id, next));
        next += 1;
    }

    if !reassigned.is_empty() {
        info!(count = reassigned.len(), "resolved global id collisions");
    }
    Ok(reassigned)
}

/// Raise `LiveSet/NextPointeeId` above every collidable id in use. Returns
/// the new value when it changed. Documents without the element are left
/// alone.
pub fn bump_next_pointee_id(doc: &mut Document) -> Result<Option<i64>, DocumentError> {
    let tree = doc.tree();
    let Some(node) = tree.find_path(tree.root(), schema::NEXT_POINTEE_ID_PATH) else {
        return Ok(None);
    };
    let current: i64 = parse_attr(tree, node, schema::VALUE)?;
    let Some(max) = collidable_ids(doc)?.into_iter().map(|(_, id)| id).max() else {
        return Ok(None);
    };
    if current > max {
        return Ok(None);
    }

    let next = max + 1;
    doc.tree_mut().set_attr(node, schema::VALUE, next.to_string());
    debug!(from = current, to = next, "raised NextPointeeId");
    Ok(Some(next))
}

fn collidable_ids(doc: &Document) -> Result<Vec<(NodeId, i64)>, DocumentError> {
    let tree = doc.tree();
    tree.descendants(tree.root())
        .into_iter()
        .filter(|&node| schema::is_collidable(tree.tag(node)))
        .map(|node| Ok((node, parse_attr(tree, node, schema::ID)?)))
        .collect()
}

//! Conflict containers: a blank Live set holding the two competing versions
//! of one track side by side.

use crate::errors::DocumentError;
use crate::model::schema::{self, require_path};
use crate::model::{Document, TrackSnapshot};

use super::Conflict;

/// Track id and display name given to our version inside a container.
pub const OURS_SLOT: (i64, &str) = (10, "Ours");

/// Track id and display name given to their version inside a container.
pub const THEIRS_SLOT: (i64, &str) = (20, "Theirs");

/// Build the container for `conflict` from a blank template document.
///
/// Every track in the template is dropped. Both versions lose their sends,
/// since the container has no return tracks for them to point at.
pub fn build(template: &Document, conflict: &Conflict) -> Result<Document, DocumentError> {
    let mut container = template.clone();
    for id in container.track_ids() {
        container.remove_track(id);
    }

    for (snapshot, (id, name)) in [(&conflict.ours, OURS_SLOT), (&conflict.theirs, THEIRS_SLOT)] {
        container.add_snapshot(&labelled(snapshot, id, name)?);
    }
    Ok(container)
}

fn labelled(snapshot: &TrackSnapshot, id: i64, name: &str) -> Result<TrackSnapshot, DocumentError> {
    let mut copy = snapshot.clone();
    copy.id = id;
    copy.routing_map.clear();

    let tree = &mut copy.tree;
    let root = tree.root();
    tree.set_attr(root, schema::ID, id.to_string());
    let user_name = require_path(tree, root, schema::USER_NAME_PATH)?;
    tree.set_attr(user_name, schema::VALUE, name);
    let sends = require_path(tree, root, schema::SENDS_PATH)?;
    tree.clear_children(sends);
    Ok(copy)
}

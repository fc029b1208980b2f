//! Send routing between tracks and return tracks.
//!
//! Live stores a track's sends positionally: the n-th `TrackSendHolder`
//! feeds the n-th return track. Once the merge has changed the set or order
//! of return tracks, every track's sends are rebuilt from its id-keyed
//! routing map.

use tracing::{debug, info};

use crate::errors::DocumentError;
use crate::model::schema::{self, require_path};
use crate::model::Document;
use crate::xml::{NodeId, XmlTree};

/// Value written into template fields of a fresh send entry.
const SEND_DEFAULT: &str = "0.0003162277571";

/// Compute each track's routing vector against the current return-track
/// order. Sends to return tracks a track has no entry for default to 0.
pub fn reconcile(doc: &mut Document) {
    let return_ids = doc.return_track_ids();
    for track in doc.tracks_mut() {
        let routing = return_ids
            .iter()
            .map(|id| track.routing_map().get(id).copied().unwrap_or(0.0))
            .collect();
        track.set_routing(routing);
    }
    debug!(returns = return_ids.len(), "reconciled routing");
}

/// Rewrite every track's `Sends` element from its routing vector.
pub fn materialize(doc: &mut Document) -> Result<(), DocumentError> {
    let plan: Vec<(NodeId, Vec<f64>)> = doc
        .tracks()
        .iter()
        .map(|t| (t.node(), t.routing().to_vec()))
        .collect();

    let tree = doc.tree_mut();
    for (node, routing) in &plan {
        let sends = require_path(tree, *node, schema::SENDS_PATH)?;
        tree.clear_children(sends);
        for (position, value) in routing.iter().enumerate() {
            let holder = send_holder(tree, position, *value);
            tree.append_child(sends, holder);
        }
    }
    info!(tracks = plan.len(), "materialized sends");
    Ok(())
}

/// Grow `LiveSet/SendsPre` to one entry per return track. Never shrinks.
/// Returns the number of entries added.
pub fn extend_sends_pre(doc: &mut Document) -> Result<usize, DocumentError> {
    let returns = doc.return_tracks().len();
    let tree = doc.tree_mut();
    let sends_pre = require_path(tree, tree.root(), schema::SENDS_PRE_PATH)?;

    let mut added = 0;
    let mut next = tree.children(sends_pre).len();
    while next < returns {
        let id = next.to_string();
        let entry = tree.new_element(
            schema::SEND_PRE_BOOL,
            &[(schema::ID, id.as_str()), (schema::VALUE, "false")],
        );
        tree.append_child(sends_pre, entry);
        next += 1;
        added += 1;
    }
    if added > 0 {
        debug!(added, total = next, "extended SendsPre");
    }
    Ok(added)
}

/// Build one detached `TrackSendHolder` in the shape Live writes for a new
/// send. Target ids are placeholders; the global id pass renumbers them.
fn send_holder(tree: &mut XmlTree, position: usize, value: f64) -> NodeId {
    let position = position.to_string();
    let value = value.to_string();

    let holder = tree.new_element(schema::SEND_HOLDER, &[(schema::ID, position.as_str())]);
    let send = tree.new_element("Send", &[]);
    tree.append_child(holder, send);

    let lom_id = tree.new_element("LomId", &[(schema::VALUE, "0")]);
    let manual = tree.new_element("Manual", &[(schema::VALUE, value.as_str())]);
    tree.append_child(send, lom_id);
    tree.append_child(send, manual);

    let range = tree.new_element("MidiControllerRange", &[]);
    let min = tree.new_element("Min", &[(schema::VALUE, SEND_DEFAULT)]);
    let max = tree.new_element("Max", &[(schema::VALUE, "1")]);
    tree.append_child(range, min);
    tree.append_child(range, max);
    tree.append_child(send, range);

    for (tag, id) in [("AutomationTarget", "8631"), ("ModulationTarget", "8632")] {
        let target = tree.new_element(tag, &[(schema::ID, id)]);
        let lock = tree.new_element("LockEnvelope", &[(schema::VALUE, "0")]);
        tree.append_child(target, lock);
        tree.append_child(send, target);
    }

    let active = tree.new_element("Active", &[(schema::VALUE, "true")]);
    tree.append_child(holder, active);
    holder
}

//! Semantic equality of track subtrees.
//!
//! Two track elements are "the same" when they differ only in bookkeeping
//! that Live rewrites on its own (selection state, arm state, file reference
//! ids, automation target ids) and in sends to return tracks that exist on
//! only one side.

use std::collections::BTreeMap;

use tracing::trace;

use crate::model::schema;
use crate::model::Document;
use crate::xml::{NodeId, XmlTree};

/// Attributes ignored per tag when comparing elements.
pub fn excluded_attributes(tag: &str) -> &'static [&'static str] {
    match tag {
        "IsContentSelected"
        | "IsArmed"
        | "SelectedDevice"
        | "SelectedEnvelope"
        | "LastSelectedTimeableIndex"
        | "LastSelectedClipEnvelopeIndex" => &["Value"],
        "RelativePathElement" | "FileRef" | "VstPreset" | "TrackSendHolder" => &["Id"],
        t if schema::is_collidable(t) => &["Id"],
        _ => &[],
    }
}

/// Mapping from return-track positions in one document to positions of the
/// same return tracks in another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correspondence(BTreeMap<usize, usize>);

impl Correspondence {
    /// Pair up return tracks that exist in both documents, by id.
    pub fn between(a: &Document, b: &Document) -> Self {
        let b_returns = b.return_track_ids();
        let pairs = a
            .return_track_ids()
            .iter()
            .enumerate()
            .filter_map(|(a_pos, id)| {
                b_returns
                    .iter()
                    .position(|other| other == id)
                    .map(|b_pos| (a_pos, b_pos))
            })
            .collect();
        Self(pairs)
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(&a, &b)| (a, b))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Deep comparison of `a_node` (in `a`) and `b_node` (in `b`).
///
/// Inside `Sends`, entries are compared by routing position through
/// `correspondence` instead of by document order.
pub fn semantically_equal(
    a: &XmlTree,
    a_node: NodeId,
    b: &XmlTree,
    b_node: NodeId,
    correspondence: &Correspondence,
) -> bool {
    let tag = a.tag(a_node);
    if tag != b.tag(b_node) {
        trace!(a = tag, b = b.tag(b_node), "tag differs");
        return false;
    }
    if a.text(a_node) != b.text(b_node) || a.tail(a_node) != b.tail(b_node) {
        trace!(tag, "text differs");
        return false;
    }
    if !attributes_equal(a, a_node, b, b_node, excluded_attributes(tag)) {
        trace!(tag, "attributes differ");
        return false;
    }

    let a_children = a.children(a_node);
    let b_children = b.children(b_node);
    if a_children.len() != b_children.len() {
        trace!(tag, a = a_children.len(), b = b_children.len(), "child count differs");
        return false;
    }

    if tag == schema::SENDS {
        return correspondence.pairs().all(|(a_pos, b_pos)| {
            match (send_holder(a, a_node, a_pos), send_holder(b, b_node, b_pos)) {
                (Some(x), Some(y)) => semantically_equal(a, x, b, y, correspondence),
                (None, None) => true,
                _ => false,
            }
        });
    }

    a_children
        .iter()
        .zip(b_children)
        .all(|(&x, &y)| semantically_equal(a, x, b, y, correspondence))
}

/// Whether two documents hold the same tracks, by id, with semantically
/// equal content.
pub fn documents_semantically_equal(a: &Document, b: &Document) -> bool {
    let mut a_ids = a.track_ids();
    let mut b_ids = b.track_ids();
    a_ids.sort_unstable();
    b_ids.sort_unstable();
    if a_ids != b_ids {
        return false;
    }

    let correspondence = Correspondence::between(a, b);
    a.tracks().iter().all(|track| {
        b.find_track(track.id()).is_some_and(|other| {
            semantically_equal(
                a.tree(),
                track.node(),
                b.tree(),
                other.node(),
                &correspondence,
            )
        })
    })
}

fn attributes_equal(
    a: &XmlTree,
    a_node: NodeId,
    b: &XmlTree,
    b_node: NodeId,
    excluded: &[&str],
) -> bool {
    let relevant = |tree: &XmlTree, node: NodeId| -> BTreeMap<String, String> {
        tree.attributes(node)
            .iter()
            .filter(|(k, _)| !excluded.contains(&k.as_str()))
            .cloned()
            .collect()
    };
    relevant(a, a_node) == relevant(b, b_node)
}

fn send_holder(tree: &XmlTree, sends: NodeId, position: usize) -> Option<NodeId> {
    let position = position.to_string();
    tree.children(sends).iter().copied().find(|&c| {
        tree.tag(c) == schema::SEND_HOLDER && tree.attr(c, schema::ID) == Some(position.as_str())
    })
}

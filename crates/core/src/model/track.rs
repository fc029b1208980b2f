//! Typed view over one track node.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::schema::{self, parse_attr, require_path};
use crate::errors::{DocumentError, XmlError};
use crate::xml::{self, NodeId, XmlTree};

/// Kind of a track element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Midi,
    Audio,
    Group,
    /// Aggregation bus other tracks send into.
    Return,
}

impl TrackKind {
    pub fn from_tag(tag: &str) -> Result<Self, DocumentError> {
        match tag {
            "MidiTrack" => Ok(Self::Midi),
            "AudioTrack" => Ok(Self::Audio),
            "GroupTrack" => Ok(Self::Group),
            "ReturnTrack" => Ok(Self::Return),
            other => Err(DocumentError::UnknownTrackKind(other.to_string())),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Midi => "MidiTrack",
            Self::Audio => "AudioTrack",
            Self::Group => "GroupTrack",
            Self::Return => "ReturnTrack",
        }
    }

    pub fn is_return(self) -> bool {
        self == Self::Return
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Midi => write!(f, "midi"),
            Self::Audio => write!(f, "audio"),
            Self::Group => write!(f, "group"),
            Self::Return => write!(f, "return"),
        }
    }
}

/// One track of a [`Document`](super::Document).
///
/// Holds the index of its element in the owning document's arena, never the
/// element itself.
#[derive(Debug, Clone)]
pub struct Track {
    id: i64,
    kind: TrackKind,
    node: NodeId,
    /// Raw send gains keyed by position in the return-track list.
    positional_sends: BTreeMap<usize, f64>,
    /// Send gains keyed by return-track id.
    routing_map: BTreeMap<i64, f64>,
    /// Send gains ordered like the current return tracks. Empty until
    /// reconciled.
    routing: Vec<f64>,
}

impl Track {
    /// Read a track element. The routing map stays empty until the owning
    /// document resolves positions with [`Track::resolve_routing`].
    pub fn from_node(tree: &XmlTree, node: NodeId) -> Result<Self, DocumentError> {
        let kind = TrackKind::from_tag(tree.tag(node))?;
        let id = parse_attr(tree, node, schema::ID)?;

        let sends = require_path(tree, node, schema::SENDS_PATH)?;
        let mut positional_sends = BTreeMap::new();
        for &holder in tree.children(sends) {
            if tree.tag(holder) != schema::SEND_HOLDER {
                continue;
            }
            let index: usize = parse_attr(tree, holder, schema::ID)?;
            let manual = require_path(tree, holder, schema::SEND_VALUE_PATH)?;
            let value: f64 = parse_attr(tree, manual, schema::VALUE)?;
            positional_sends.insert(index, value);
        }

        Ok(Self {
            id,
            kind,
            node,
            positional_sends,
            routing_map: BTreeMap::new(),
            routing: Vec::new(),
        })
    }

    /// Re-key positional send entries by the id of the return track at that
    /// position. Positions past the end of `return_ids` are dropped.
    pub(crate) fn resolve_routing(&mut self, return_ids: &[i64]) {
        self.routing_map = self
            .positional_sends
            .iter()
            .filter_map(|(&index, &value)| match return_ids.get(index) {
                Some(&return_id) => Some((return_id, value)),
                None => {
                    warn!(
                        track = self.id,
                        index,
                        returns = return_ids.len(),
                        "send refers to a return track that does not exist, ignoring"
                    );
                    None
                }
            })
            .collect();
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_return(&self) -> bool {
        self.kind.is_return()
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn routing_map(&self) -> &BTreeMap<i64, f64> {
        &self.routing_map
    }

    /// The finalized routing vector, aligned with the return-track order at
    /// the time of the last reconciliation.
    pub fn routing(&self) -> &[f64] {
        &self.routing
    }

    pub(crate) fn set_routing(&mut self, routing: Vec<f64>) {
        self.routing = routing;
    }

    /// Independent copy of this track, taken from the tree that owns it.
    pub fn snapshot(&self, tree: &XmlTree) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            kind: self.kind,
            routing_map: self.routing_map.clone(),
            tree: tree.extract_subtree(self.node),
        }
    }

    /// Same track rebased onto a node in another arena.
    pub(crate) fn relocated(&self, node: NodeId) -> Self {
        Self {
            node,
            routing: Vec::new(),
            ..self.clone()
        }
    }
}

/// An owned copy of a track that shares nothing with any live document.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    pub id: i64,
    pub kind: TrackKind,
    pub routing_map: BTreeMap<i64, f64>,
    /// The track element as the root of its own tree.
    pub tree: XmlTree,
}

impl TrackSnapshot {
    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        xml::subtree_to_string(&self.tree, self.tree.root())
    }

    /// Wrapper for the snapshot's root so it can be imported like a live
    /// track.
    pub(crate) fn as_track(&self) -> Track {
        Track {
            id: self.id,
            kind: self.kind,
            node: self.tree.root(),
            positional_sends: BTreeMap::new(),
            routing_map: self.routing_map.clone(),
            routing: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    const TRACK: &str = r#"<AudioTrack Id="8">
        <Name><UserName Value="Vox"/></Name>
        <DeviceChain><Mixer><Sends>
            <TrackSendHolder Id="0"><Send><Manual Value="0.25"/></Send></TrackSendHolder>
            <TrackSendHolder Id="1"><Send><Manual Value="0.75"/></Send></TrackSendHolder>
            <TrackSendHolder Id="5"><Send><Manual Value="1"/></Send></TrackSendHolder>
        </Sends></Mixer></DeviceChain>
    </AudioTrack>"#;

    #[test]
    fn test_from_node_reads_id_kind_and_sends() {
        let tree = parse(TRACK).unwrap();
        let mut track = Track::from_node(&tree, tree.root()).unwrap();
        assert_eq!(track.id(), 8);
        assert_eq!(track.kind(), TrackKind::Audio);
        assert!(!track.is_return());

        track.resolve_routing(&[30, 31]);
        // Position 5 has no return track behind it and is dropped.
        assert_eq!(
            track.routing_map().iter().map(|(&k, &v)| (k, v)).collect::<Vec<_>>(),
            vec![(30, 0.25), (31, 0.75)]
        );
    }

    #[test]
    fn test_routing_map_is_keyed_by_return_id() {
        let tree = parse(TRACK).unwrap();
        let mut track = Track::from_node(&tree, tree.root()).unwrap();
        track.resolve_routing(&[31, 30]);
        assert_eq!(track.routing_map().get(&31), Some(&0.25));
        assert_eq!(track.routing_map().get(&30), Some(&0.75));
    }

    #[test]
    fn test_missing_sends_is_malformed() {
        let tree = parse(r#"<MidiTrack Id="1"><DeviceChain/></MidiTrack>"#).unwrap();
        assert!(matches!(
            Track::from_node(&tree, tree.root()),
            Err(DocumentError::MissingNode { .. })
        ));
    }

    #[test]
    fn test_unknown_track_kind() {
        let tree = parse(r#"<MasterTrack Id="1"/>"#).unwrap();
        assert!(matches!(
            Track::from_node(&tree, tree.root()),
            Err(DocumentError::UnknownTrackKind(ref tag)) if tag == "MasterTrack"
        ));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let tree = parse(TRACK).unwrap();
        let track = Track::from_node(&tree, tree.root()).unwrap();
        let snapshot = track.snapshot(&tree);
        assert_eq!(snapshot.id, 8);
        assert_eq!(snapshot.tree.tag(snapshot.tree.root()), "AudioTrack");
        assert!(snapshot.to_xml_string().unwrap().starts_with("<AudioTrack Id=\"8\">"));
    }
}

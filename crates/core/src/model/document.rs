//! A whole Live set: the XML tree plus an ordered view of its tracks.

use std::path::Path;

use tracing::{debug, info};

use super::schema::{self, require_path};
use super::track::{Track, TrackSnapshot};
use crate::errors::{DocumentError, XmlError};
use crate::package::{self, Compression};
use crate::xml::{self, NodeId, XmlTree};

/// One version of a Live set.
///
/// The track list and the tree's `LiveSet/Tracks` element are kept in step by
/// every mutating method; there is no separate flush.
#[derive(Debug, Clone)]
pub struct Document {
    tree: XmlTree,
    tracks_node: NodeId,
    tracks: Vec<Track>,
}

impl Document {
    /// Build the track view over a parsed tree.
    pub fn from_tree(tree: XmlTree) -> Result<Self, DocumentError> {
        let tracks_node = require_path(&tree, tree.root(), schema::TRACKS_PATH)?;
        let mut tracks = tree
            .children(tracks_node)
            .iter()
            .map(|&node| Track::from_node(&tree, node))
            .collect::<Result<Vec<_>, _>>()?;

        let return_ids: Vec<i64> = tracks
            .iter()
            .filter(|t| t.is_return())
            .map(Track::id)
            .collect();
        for track in &mut tracks {
            track.resolve_routing(&return_ids);
        }

        debug!(
            tracks = tracks.len(),
            returns = return_ids.len(),
            "built document model"
        );
        Ok(Self {
            tree,
            tracks_node,
            tracks,
        })
    }

    pub fn parse(content: &str) -> Result<Self, DocumentError> {
        Self::from_tree(xml::parse(content)?)
    }

    /// Load a `.als` (gzip) or plain XML file.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        info!(path = %path.display(), "loading document");
        let bytes = package::read_document_bytes(path)?;
        let content =
            String::from_utf8(bytes).map_err(|e| XmlError::Encoding(e.to_string()))?;
        Self::parse(&content)
    }

    pub fn to_xml_string(&self) -> Result<String, DocumentError> {
        Ok(xml::to_string(&self.tree)?)
    }

    pub fn save(&self, path: &Path, compression: Compression) -> Result<(), DocumentError> {
        let compress = compression.applies_to(path);
        info!(path = %path.display(), compress, tracks = self.tracks.len(), "saving document");
        package::write_document(path, &self.to_xml_string()?, compress)?;
        Ok(())
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut XmlTree {
        &mut self.tree
    }

    /// Tracks in document order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn track_ids(&self) -> Vec<i64> {
        self.tracks.iter().map(Track::id).collect()
    }

    /// Return tracks in their relative document order.
    pub fn return_tracks(&self) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.is_return()).collect()
    }

    pub fn return_track_ids(&self) -> Vec<i64> {
        self.tracks
            .iter()
            .filter(|t| t.is_return())
            .map(Track::id)
            .collect()
    }

    pub fn find_track(&self, id: i64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    /// Look up a track that the caller knows is present.
    pub fn track_by_id(&self, id: i64) -> Result<&Track, DocumentError> {
        self.find_track(id).ok_or(DocumentError::TrackNotFound(id))
    }

    pub fn contains_track(&self, id: i64) -> bool {
        self.find_track(id).is_some()
    }

    /// Owned copy of the track with `id`.
    pub fn snapshot(&self, id: i64) -> Result<TrackSnapshot, DocumentError> {
        Ok(self.track_by_id(id)?.snapshot(&self.tree))
    }

    /// The `LiveSet` element.
    pub fn live_set(&self) -> Result<NodeId, DocumentError> {
        require_path(&self.tree, self.tree.root(), &[schema::LIVE_SET])
    }

    /// Append a copy of `track` (owned by `source`) to the end of the track
    /// list.
    pub fn add_track(&mut self, source: &Document, track: &Track) {
        self.import(&source.tree, track);
    }

    /// Append a copy of a snapshot to the end of the track list.
    pub fn add_snapshot(&mut self, snapshot: &TrackSnapshot) {
        self.import(&snapshot.tree, &snapshot.as_track());
    }

    fn import(&mut self, source: &XmlTree, track: &Track) {
        let node = self.tree.import_subtree(source, track.node());
        self.tree.set_tail(node, None);
        self.tree.append_child(self.tracks_node, node);
        self.tracks.push(track.relocated(node));
        debug!(id = track.id(), kind = %track.kind(), "added track");
    }

    /// Remove every track with `id`. Returns how many were removed.
    pub fn remove_track(&mut self, id: i64) -> usize {
        let mut removed = 0;
        let tree = &mut self.tree;
        self.tracks.retain(|t| {
            if t.id() == id {
                tree.detach(t.node());
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(id, "removed track");
        }
        removed
    }

    /// Remove the track with the same id as `track`, then append `track`.
    pub fn replace_track(&mut self, source: &Document, track: &Track) {
        self.remove_track(track.id());
        self.add_track(source, track);
    }

    /// Snapshot variant of [`replace_track`](Self::replace_track).
    pub fn replace_with_snapshot(&mut self, snapshot: &TrackSnapshot) {
        self.remove_track(snapshot.id);
        self.add_snapshot(snapshot);
    }

    /// Stable partition: regular tracks keep their order, then return
    /// tracks in theirs.
    pub fn move_return_tracks_to_end(&mut self) {
        let (regular, returns): (Vec<Track>, Vec<Track>) = std::mem::take(&mut self.tracks)
            .into_iter()
            .partition(|t| !t.is_return());
        for track in &returns {
            self.tree.append_child(self.tracks_node, track.node());
        }
        self.tracks = regular;
        self.tracks.extend(returns);
    }

    /// Change the id of the track at `index` in both the view and the tree.
    pub fn set_track_id(&mut self, index: usize, id: i64) {
        let track = &mut self.tracks[index];
        track.set_id(id);
        self.tree.set_attr(track.node(), schema::ID, id.to_string());
    }
}

//! Fixed locations and tag names of the Live set schema that the merge
//! touches. Everything else in a document is carried through opaquely.

use std::str::FromStr;

use crate::errors::DocumentError;
use crate::xml::{NodeId, XmlTree};

pub const LIVE_SET: &str = "LiveSet";

/// Track list, relative to the document root.
pub const TRACKS_PATH: &[&str] = &["LiveSet", "Tracks"];

/// Per-return-track auxiliary list, relative to the document root.
pub const SENDS_PRE_PATH: &[&str] = &["LiveSet", "SendsPre"];

/// Next id Live will hand out, relative to the document root.
pub const NEXT_POINTEE_ID_PATH: &[&str] = &["LiveSet", "NextPointeeId"];

/// Routing collection, relative to a track node.
pub const SENDS_PATH: &[&str] = &["DeviceChain", "Mixer", "Sends"];

/// Routing entry tag inside [`SENDS_PATH`].
pub const SEND_HOLDER: &str = "TrackSendHolder";

/// Tag of the routing collection itself.
pub const SENDS: &str = "Sends";

/// Gain of one routing entry, relative to the entry.
pub const SEND_VALUE_PATH: &[&str] = &["Send", "Manual"];

/// Display name, relative to a track node.
pub const USER_NAME_PATH: &[&str] = &["Name", "UserName"];

pub const SEND_PRE_BOOL: &str = "SendPreBool";

pub const ID: &str = "Id";
pub const VALUE: &str = "Value";

/// Node kinds whose `Id` must be unique across the whole document.
pub const COLLIDABLE_TAGS: &[&str] = &[
    "AutomationTarget",
    "ModulationTarget",
    "VolumeModulationTarget",
    "TranspositionModulationTarget",
    "GrainSizeModulationTarget",
    "FluxModulationTarget",
    "SampleOffsetModulationTarget",
];

pub fn is_collidable(tag: &str) -> bool {
    COLLIDABLE_TAGS.contains(&tag)
}

/// Resolve a required path below `start`.
pub fn require_path(tree: &XmlTree, start: NodeId, path: &[&str]) -> Result<NodeId, DocumentError> {
    tree.find_path(start, path)
        .ok_or_else(|| DocumentError::MissingNode {
            parent: tree.tag(start).to_string(),
            path: path.join("/"),
        })
}

/// Read and parse a required attribute.
pub fn parse_attr<T: FromStr>(tree: &XmlTree, node: NodeId, name: &str) -> Result<T, DocumentError> {
    let raw = tree
        .attr(node, name)
        .ok_or_else(|| DocumentError::MissingAttribute {
            tag: tree.tag(node).to_string(),
            attribute: name.to_string(),
        })?;
    raw.trim()
        .parse()
        .map_err(|_| DocumentError::InvalidAttribute {
            tag: tree.tag(node).to_string(),
            attribute: name.to_string(),
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn test_require_path_reports_missing_segment() {
        let tree = parse("<MidiTrack Id=\"1\"><DeviceChain/></MidiTrack>").unwrap();
        let err = require_path(&tree, tree.root(), SENDS_PATH).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required node 'DeviceChain/Mixer/Sends' under <MidiTrack>"
        );
    }

    #[test]
    fn test_parse_attr() {
        let tree = parse("<MidiTrack Id=\"12\" Bad=\"x\"/>").unwrap();
        let root = tree.root();
        assert_eq!(parse_attr::<i64>(&tree, root, ID).unwrap(), 12);
        assert!(matches!(
            parse_attr::<i64>(&tree, root, "Bad"),
            Err(DocumentError::InvalidAttribute { .. })
        ));
        assert!(matches!(
            parse_attr::<i64>(&tree, root, "Missing"),
            Err(DocumentError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_collidable_tags() {
        assert!(is_collidable("AutomationTarget"));
        assert!(is_collidable("SampleOffsetModulationTarget"));
        assert!(!is_collidable("TrackSendHolder"));
    }
}

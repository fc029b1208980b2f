//! Divergent track edits and their hand-off to a human.
//!
//! The conflict subsystem is responsible for:
//! 1. **Containers** -- a small Live set per conflict holding both versions.
//! 2. **Launching** -- opening the external resolver on those containers.
//! 3. **Resolution** -- waiting for the resolver's choice and applying it.

pub mod container;
pub mod coordinator;
pub mod launcher;
pub mod resolution;

use serde::{Deserialize, Serialize};

use crate::errors::XmlError;
use crate::model::TrackSnapshot;

pub use coordinator::{ConflictCoordinator, CoordinatorState};
pub use launcher::{CommandLauncher, ResolverLauncher};
pub use resolution::{Choice, Resolution};

/// One track edited differently in both branches.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub track_id: i64,
    pub base: TrackSnapshot,
    pub ours: TrackSnapshot,
    pub theirs: TrackSnapshot,
}

impl Conflict {
    pub fn new(base: TrackSnapshot, ours: TrackSnapshot, theirs: TrackSnapshot) -> Self {
        Self {
            track_id: base.id,
            base,
            ours,
            theirs,
        }
    }

    /// The snapshot for the chosen branch.
    pub fn chosen(&self, choice: Choice) -> &TrackSnapshot {
        match choice {
            Choice::Ours => &self.ours,
            Choice::Theirs => &self.theirs,
        }
    }

    /// Serializable form written beside each container.
    pub fn record(&self) -> Result<ConflictRecord, XmlError> {
        Ok(ConflictRecord {
            track_id: self.track_id,
            base: self.base.to_xml_string()?,
            ours: self.ours.to_xml_string()?,
            theirs: self.theirs.to_xml_string()?,
        })
    }
}

/// The three versions of a conflicting track as XML text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictRecord {
    pub track_id: i64,
    pub base: String,
    pub ours: String,
    pub theirs: String,
}

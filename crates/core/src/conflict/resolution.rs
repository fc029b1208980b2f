//! The resolver's answer.
//!
//! The resolver signals completion by writing a JSON object that maps each
//! container's file name to a boolean: `true` keeps our version, `false`
//! keeps theirs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConflictError;

/// Which branch's version of a conflicting track to keep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Ours,
    Theirs,
}

impl From<bool> for Choice {
    fn from(ours: bool) -> Self {
        if ours {
            Self::Ours
        } else {
            Self::Theirs
        }
    }
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// Parsed resolution artifact, keyed by container file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    choices: BTreeMap<String, Choice>,
}

impl Resolution {
    /// Parse artifact text. `path` is only used in error messages.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConflictError> {
        let raw: BTreeMap<String, bool> =
            serde_json::from_str(content).map_err(|e| ConflictError::InvalidArtifact {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;

        let choices = raw
            .into_iter()
            .map(|(key, ours)| (file_name_of(&key), Choice::from(ours)))
            .collect();
        Ok(Self { choices })
    }

    /// Pick a choice for every expected container, in order.
    ///
    /// A container without an entry is an error; entries for containers
    /// that were never offered are logged and skipped.
    pub fn choices_for(&self, expected: &[String]) -> Result<Vec<Choice>, ConflictError> {
        for key in self.choices.keys() {
            if !expected.contains(key) {
                warn!(key = %key, "resolution names an unknown conflict, ignoring");
            }
        }
        expected
            .iter()
            .map(|name| {
                self.choices
                    .get(name)
                    .copied()
                    .ok_or_else(|| ConflictError::MissingResolution(name.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

fn file_name_of(key: &str) -> String {
    Path::new(key)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string())
}

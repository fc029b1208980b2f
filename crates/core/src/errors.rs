//! Error types for the livemerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Package(#[from] PackageError),
}

// ---------------------------------------------------------------------------
// XML errors
// ---------------------------------------------------------------------------

/// Errors from reading or writing the XML tree.
#[derive(Debug, Error)]
pub enum XmlError {
    /// Syntax error reported by the XML reader.
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { message: String, position: u64 },

    /// Input ended while elements were still open.
    #[error("unexpected end of input, expected closing tag </{expected}>")]
    UnexpectedEof { expected: String },

    /// Closing tag does not match the open element.
    #[error("mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEndTag { expected: String, found: String },

    /// No root element.
    #[error("empty XML document: no root element found")]
    EmptyDocument,

    /// More than one top-level element.
    #[error("XML document has more than one root element")]
    MultipleRoots,

    /// The document bytes are not valid UTF-8.
    #[error("XML document is not valid UTF-8: {0}")]
    Encoding(String),

    /// Serialisation failed.
    #[error("failed to write XML: {0}")]
    Write(String),
}

// ---------------------------------------------------------------------------
// Document errors
// ---------------------------------------------------------------------------

/// Errors from the document / track model. All of these mean the input does
/// not have the shape a Live set must have.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// A required nested node is absent.
    #[error("missing required node '{path}' under <{parent}>")]
    MissingNode { parent: String, path: String },

    /// A required attribute is absent.
    #[error("<{tag}> is missing required attribute '{attribute}'")]
    MissingAttribute { tag: String, attribute: String },

    /// An attribute could not be parsed as the expected type.
    #[error("<{tag}> has invalid {attribute}=\"{value}\"")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        value: String,
    },

    /// A child of the track list is not a known track element.
    #[error("unknown track element <{0}>")]
    UnknownTrackKind(String),

    /// A track id was queried that is not in the document.
    #[error("track {0} not found in document")]
    TrackNotFound(i64),

    /// Underlying XML error.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// Reading or writing the document file failed.
    #[error(transparent)]
    Package(#[from] PackageError),
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Stages of a merge, used to report where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Load,
    Classification,
    Apply,
    Additions,
    Resolution,
    Finalization,
}

impl std::fmt::Display for MergeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Classification => write!(f, "classification"),
            Self::Apply => write!(f, "apply"),
            Self::Additions => write!(f, "additions"),
            Self::Resolution => write!(f, "resolution"),
            Self::Finalization => write!(f, "finalization"),
        }
    }
}

/// Errors from the merge engine.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The document model rejected the input during a stage.
    #[error("merge failed during {stage}: {source}")]
    Document {
        stage: MergeStage,
        #[source]
        source: DocumentError,
    },

    /// Conflict hand-off or resolution failed.
    #[error("merge failed during resolution: {0}")]
    Conflict(#[from] ConflictError),
}

impl MergeError {
    /// The stage at which the merge failed.
    pub fn stage(&self) -> MergeStage {
        match self {
            Self::Document { stage, .. } => *stage,
            Self::Conflict(_) => MergeStage::Resolution,
        }
    }
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from the conflict resolution coordinator.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// An operation was called in the wrong coordinator state.
    #[error("invalid coordinator transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The blank template or a conflict container could not be built.
    #[error("failed to build conflict container: {0}")]
    Container(#[from] DocumentError),

    /// The external resolver could not be started.
    #[error("failed to launch resolver '{command}': {detail}")]
    LaunchFailed { command: String, detail: String },

    /// The resolution artifact could not be parsed.
    #[error("invalid resolution artifact '{path}': {detail}")]
    InvalidArtifact { path: String, detail: String },

    /// The resolution artifact has no entry for a pending conflict.
    #[error("resolution artifact has no choice for '{0}'")]
    MissingResolution(String),

    /// No resolution arrived before the configured deadline.
    #[error("timed out after {waited_secs}s waiting for conflict resolution")]
    TimedOut { waited_secs: u64 },

    /// The wait was cancelled by the caller.
    #[error("conflict resolution was cancelled")]
    Cancelled,

    /// Packaging a container failed.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Scratch directory I/O.
    #[error("conflict scratch I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Packaging errors
// ---------------------------------------------------------------------------

/// Errors from reading, writing and compressing document files.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The file does not exist.
    #[error("document file not found: {0}")]
    FileNotFound(String),

    /// Decompression failed.
    #[error("failed to decompress '{path}': {detail}")]
    Decompress { path: String, detail: String },

    /// Generic I/O wrapper.
    #[error("document I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

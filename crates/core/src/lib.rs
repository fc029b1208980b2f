//! livemerge core library.
//!
//! This crate provides the components for three-way merging of Ableton Live
//! sets: XML and container I/O, the track model, semantic equality, the merge
//! engine with id and routing repair, and the hand-off of conflicting edits
//! to an external resolver.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod merge;
pub mod model;
pub mod package;
pub mod xml;

// Re-exports for convenience.
pub use config::MergeConfig;
pub use errors::{CoreError, MergeError, MergeStage};
pub use merge::{MergeEngine, MergeOutcome, MergeStats};
pub use model::{Document, Track, TrackKind};
pub use package::Compression;

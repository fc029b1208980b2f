//! Typed view over a Live set document.
//!
//! A [`Document`] owns its XML arena; each [`Track`] records the arena index
//! of its element together with the routing data the merge works on.

pub mod document;
pub mod schema;
pub mod track;

pub use document::Document;
pub use track::{Track, TrackKind, TrackSnapshot};

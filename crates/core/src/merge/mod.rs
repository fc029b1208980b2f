//! The merge itself: equality, classification, id repair and routing.

pub mod collision;
pub mod engine;
pub mod equality;
pub mod routing;

pub use engine::{MergeEngine, MergeOutcome, MergeStats};
pub use equality::{documents_semantically_equal, semantically_equal, Correspondence};

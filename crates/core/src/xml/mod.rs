//! XML tree storage, parsing and serialisation.
//!
//! Live sets are plain XML once decompressed. The merge needs an owned,
//! index-addressed tree it can freely restructure, so documents are read
//! into an [`XmlTree`] arena rather than kept as a streaming view.

pub mod parser;
pub mod tree;
pub mod writer;

pub use parser::parse;
pub use tree::{Node, NodeId, XmlTree};
pub use writer::{subtree_to_string, to_string};

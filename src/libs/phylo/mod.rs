pub mod error;
pub mod node;
pub mod parser;
pub mod tree;
pub mod writer;

pub use error::TreeError;
pub use node::{Node, NodeId};
pub use tree::Tree;

/// Smallest branch length kept on input. Zero, negative and sub-epsilon
/// lengths are floored to this value when a tree is parsed.
pub const MIN_BRLEN: f64 = 1e-10;

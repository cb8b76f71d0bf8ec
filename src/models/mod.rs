//! Domain models for the feature tree.
//!
//! - [`FeatureNode`]: the single tree entity, linked to its parent by id.
//! - [`NodeLevel`] / [`NodeStatus`]: closed value sets for depth and progress.
//! - [`Project`]: tenant scope owning a tree.
//! - [`BulkNodeInput`]: placeholder-linked entries for bulk creation and import.
//! - [`SearchQuery`] / [`SearchResult`]: filter input and ancestor-aware output.

mod bulk;
mod node;
mod project;
mod search;

pub use bulk::*;
pub use node::*;
pub use project::*;
pub use search::*;

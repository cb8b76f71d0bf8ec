use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::{NodeLevel, NodeStatus};

/// Filters for tree-aware search. Empty filters match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub statuses: Vec<NodeStatus>,
    #[serde(default)]
    pub levels: Vec<NodeLevel>,
}

/// Search output, with ids in tree order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Nodes satisfying the query and filters.
    pub matching_ids: Vec<Uuid>,
    /// Matches plus all their ancestors, for rendering inside the hierarchy.
    pub display_ids: Vec<Uuid>,
    pub total_matches: usize,
    /// Counts over the whole live tree, ignoring the active filters.
    pub status_counts: BTreeMap<NodeStatus, usize>,
    pub level_counts: BTreeMap<NodeLevel, usize>,
}

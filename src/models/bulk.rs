use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::{NodeLevel, NodeStatus};
use crate::error::{TreeError, TreeResult};

/// Largest batch accepted by bulk creation and import.
pub const MAX_BATCH_SIZE: usize = 200;

/// One entry of a bulk batch, linked to its parent by placeholder id.
///
/// `temp_id` values are chosen by the caller (an AI planner, an import
/// parser) and only need to be unique within the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkNodeInput {
    pub temp_id: String,
    #[serde(default)]
    pub parent_temp_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub level: NodeLevel,
    /// Initial status. Defaults to `not_started`.
    #[serde(default)]
    pub status: Option<NodeStatus>,
}

/// A batch of nodes to create in one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCreateInput {
    pub nodes: Vec<BulkNodeInput>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Outcome of a fully applied batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCreateResult {
    pub created_count: usize,
    /// Real ids in insertion order (parents always before children).
    pub real_ids: Vec<Uuid>,
    pub id_map: HashMap<String, Uuid>,
}

/// Check a batch before anything is written.
///
/// Besides required fields and placeholder references, the level ladder is
/// enforced inside the batch: entries without a parent must be epics and
/// each child sits exactly one level below its parent. That also rules out
/// self-references and reference cycles.
pub fn validate_batch(nodes: &[BulkNodeInput]) -> TreeResult<()> {
    if nodes.len() > MAX_BATCH_SIZE {
        return Err(TreeError::validation(format!(
            "Batch has {} nodes; at most {} are allowed",
            nodes.len(),
            MAX_BATCH_SIZE
        )));
    }

    let mut levels: HashMap<&str, NodeLevel> = HashMap::with_capacity(nodes.len());
    let mut seen = HashSet::with_capacity(nodes.len());
    for (index, entry) in nodes.iter().enumerate() {
        if entry.temp_id.trim().is_empty() {
            return Err(TreeError::validation(format!(
                "Entry {} has an empty temp_id",
                index
            )));
        }
        if entry.title.trim().is_empty() {
            return Err(TreeError::validation(format!(
                "Entry '{}' has an empty title",
                entry.temp_id
            )));
        }
        if !seen.insert(entry.temp_id.as_str()) {
            return Err(TreeError::validation(format!(
                "Duplicate temp_id '{}'",
                entry.temp_id
            )));
        }
        levels.insert(entry.temp_id.as_str(), entry.level);
    }

    for entry in nodes {
        let expected = match entry.parent_temp_id.as_deref() {
            None => Some(NodeLevel::Epic),
            Some(parent) => levels
                .get(parent)
                .ok_or_else(|| {
                    TreeError::validation(format!(
                        "Entry '{}' references unknown parent '{}'",
                        entry.temp_id, parent
                    ))
                })?
                .child_level(),
        };

        if expected != Some(entry.level) {
            return Err(TreeError::validation(match expected {
                Some(level) => format!(
                    "Entry '{}' must be at level {} but is {}",
                    entry.temp_id,
                    level.as_str(),
                    entry.level.as_str()
                ),
                None => format!("Entry '{}' is placed under a task", entry.temp_id),
            }));
        }
    }

    Ok(())
}

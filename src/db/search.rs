use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use super::Database;
use crate::error::TreeResult;
use crate::models::*;

impl Database {
    /// Find nodes matching a query and the ancestors needed to display them.
    ///
    /// The live tree is loaded once. Status and level counts always cover
    /// the whole tree so filter controls can show totals.
    pub fn search(&self, project_id: Uuid, query: &SearchQuery) -> TreeResult<SearchResult> {
        let forest = self.get_tree(project_id)?;
        let ordered = flatten_forest(&forest);

        let needle = query
            .query
            .as_deref()
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut status_counts: BTreeMap<NodeStatus, usize> =
            NodeStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut level_counts: BTreeMap<NodeLevel, usize> =
            NodeLevel::ALL.iter().map(|l| (*l, 0)).collect();
        let mut parents: HashMap<Uuid, Option<Uuid>> = HashMap::with_capacity(ordered.len());
        let mut matching_ids = Vec::new();

        for tree_node in &ordered {
            let node = &tree_node.node;
            *status_counts.entry(node.status).or_default() += 1;
            *level_counts.entry(node.level).or_default() += 1;
            parents.insert(node.id, node.parent_id);

            if matches_query(node, needle.as_deref(), query) {
                matching_ids.push(node.id);
            }
        }

        let mut visible: HashSet<Uuid> = HashSet::with_capacity(matching_ids.len());
        for id in &matching_ids {
            let mut current = Some(*id);
            while let Some(node_id) = current {
                if !visible.insert(node_id) {
                    break;
                }
                current = parents.get(&node_id).copied().flatten();
            }
        }

        let display_ids = ordered
            .iter()
            .map(|tree_node| tree_node.node.id)
            .filter(|id| visible.contains(id))
            .collect();

        tracing::debug!(
            project_id = %project_id,
            matches = matching_ids.len(),
            "Searched tree"
        );

        Ok(SearchResult {
            total_matches: matching_ids.len(),
            matching_ids,
            display_ids,
            status_counts,
            level_counts,
        })
    }
}

fn matches_query(node: &FeatureNode, needle: Option<&str>, query: &SearchQuery) -> bool {
    if !query.statuses.is_empty() && !query.statuses.contains(&node.status) {
        return false;
    }
    if !query.levels.is_empty() && !query.levels.contains(&node.level) {
        return false;
    }
    let Some(needle) = needle else {
        return true;
    };
    node.title.to_lowercase().contains(needle)
        || node
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
}

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use super::cascade::cascade_from;
use super::{
    fetch_node, insert_node, live_children, live_nodes, next_position, require_project, Database,
};
use crate::error::{TreeError, TreeResult};
use crate::models::*;

impl Database {
    // ============================================================
    // Node store
    // ============================================================

    /// Create a single node, appended after its live siblings.
    ///
    /// The level is derived from the parent: roots are epics, and each child
    /// sits exactly one step below its parent. Tasks cannot have children.
    pub fn create_node(&self, project_id: Uuid, input: CreateNodeInput) -> TreeResult<FeatureNode> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(TreeError::validation("Title must not be empty"));
        }

        let conn = self.lock();
        require_project(&conn, project_id)?;

        let level = match input.parent_id {
            Some(parent_id) => {
                let parent = fetch_node(&conn, project_id, parent_id, false)?
                    .ok_or_else(|| TreeError::parent_not_found(parent_id))?;
                parent.level.child_level().ok_or_else(|| {
                    TreeError::validation(format!(
                        "{} nodes cannot have children",
                        parent.level.label()
                    ))
                })?
            }
            None => NodeLevel::Epic,
        };

        let now = Utc::now();
        let node = FeatureNode {
            id: Uuid::new_v4(),
            project_id,
            parent_id: input.parent_id,
            title: title.to_string(),
            description: input.description,
            level,
            status: NodeStatus::NotStarted,
            position: next_position(&conn, project_id, input.parent_id)?,
            deleted_at: None,
            created_by: input.created_by,
            origin_id: input.origin_id,
            created_at: now,
            updated_at: now,
        };
        insert_node(&conn, &node)?;

        tracing::debug!(
            node_id = %node.id,
            level = node.level.as_str(),
            position = node.position,
            "Created node"
        );

        Ok(node)
    }

    /// Fetch a live node.
    pub fn get_node(&self, project_id: Uuid, id: Uuid) -> TreeResult<Option<FeatureNode>> {
        let conn = self.lock();
        fetch_node(&conn, project_id, id, false)
    }

    /// Live children of a node, in sibling order.
    pub fn get_children(&self, project_id: Uuid, parent_id: Uuid) -> TreeResult<Vec<FeatureNode>> {
        let conn = self.lock();
        fetch_node(&conn, project_id, parent_id, false)?
            .ok_or_else(|| TreeError::node_not_found(parent_id))?;
        live_children(&conn, project_id, Some(parent_id))
    }

    /// The project's live forest, every children list sorted by position.
    pub fn get_tree(&self, project_id: Uuid) -> TreeResult<Vec<FeatureTreeNode>> {
        let conn = self.lock();
        require_project(&conn, project_id)?;
        let nodes = live_nodes(&conn, project_id)?;
        Ok(build_forest(nodes))
    }

    pub fn update_node(
        &self,
        project_id: Uuid,
        id: Uuid,
        input: UpdateNodeInput,
    ) -> TreeResult<FeatureNode> {
        let conn = self.lock();
        let existing =
            fetch_node(&conn, project_id, id, false)?.ok_or_else(|| TreeError::node_not_found(id))?;

        let title = match input.title {
            Some(title) if title.trim().is_empty() => {
                return Err(TreeError::validation("Title must not be empty"))
            }
            Some(title) => title.trim().to_string(),
            None => existing.title,
        };
        // A blank description clears it.
        let description = match input.description {
            Some(description) if description.trim().is_empty() => None,
            Some(description) => Some(description),
            None => existing.description,
        };
        let now = Utc::now();

        conn.execute(
            "UPDATE feature_nodes SET title = ?, description = ?, updated_at = ? WHERE id = ?",
            (&title, &description, now.to_rfc3339(), id.to_string()),
        )?;

        Ok(FeatureNode {
            title,
            description,
            updated_at: now,
            ..existing
        })
    }

    /// Soft-delete a node together with its live descendants.
    ///
    /// All rows share one `deleted_at` timestamp. Positions of the remaining
    /// siblings are left untouched, and the parent's rollup is recomputed.
    /// Returns the number of rows marked.
    pub fn delete_node(&self, project_id: Uuid, id: Uuid) -> TreeResult<usize> {
        let conn = self.lock();
        let node =
            fetch_node(&conn, project_id, id, false)?.ok_or_else(|| TreeError::node_not_found(id))?;

        let now = Utc::now().to_rfc3339();
        let marked = conn.execute(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT ?1
                 UNION ALL
                 SELECT n.id FROM feature_nodes n JOIN subtree s ON n.parent_id = s.id
                 WHERE n.deleted_at IS NULL
             )
             UPDATE feature_nodes SET deleted_at = ?2, updated_at = ?2
             WHERE id IN (SELECT id FROM subtree) AND deleted_at IS NULL",
            (id.to_string(), &now),
        )?;

        tracing::info!(node_id = %id, marked, "Soft-deleted node");

        let (log, _) = cascade_from(&conn, project_id, node.parent_id);
        if !log.is_empty() {
            tracing::debug!(changes = log.len(), "Rollup adjusted after delete");
        }

        Ok(marked)
    }

    /// Restore a soft-deleted node. Its descendants stay deleted.
    ///
    /// The parent must be live. If another sibling took the node's position
    /// in the meantime, the node is re-appended after its live siblings.
    pub fn restore_node(&self, project_id: Uuid, id: Uuid) -> TreeResult<FeatureNode> {
        let conn = self.lock();
        let node =
            fetch_node(&conn, project_id, id, true)?.ok_or_else(|| TreeError::node_not_found(id))?;

        if !node.is_deleted() {
            return Err(TreeError::validation("Node is not deleted"));
        }

        if let Some(parent_id) = node.parent_id {
            if fetch_node(&conn, project_id, parent_id, false)?.is_none() {
                return Err(TreeError::validation(
                    "Parent node is deleted; restore the parent first",
                ));
            }
        }

        let taken: i64 = conn.query_row(
            "SELECT COUNT(*) FROM feature_nodes
             WHERE project_id = ?1 AND parent_id IS ?2 AND position = ?3 AND deleted_at IS NULL",
            (
                project_id.to_string(),
                node.parent_id.map(|u| u.to_string()),
                node.position,
            ),
            |row| row.get(0),
        )?;
        let position = if taken > 0 {
            next_position(&conn, project_id, node.parent_id)?
        } else {
            node.position
        };

        let now = Utc::now();
        conn.execute(
            "UPDATE feature_nodes SET deleted_at = NULL, position = ?, updated_at = ? WHERE id = ?",
            (position, now.to_rfc3339(), id.to_string()),
        )?;

        tracing::info!(node_id = %id, position, "Restored node");

        cascade_from(&conn, project_id, node.parent_id);

        Ok(FeatureNode {
            deleted_at: None,
            position,
            updated_at: now,
            ..node
        })
    }
}

/// Assemble flat nodes into a forest.
///
/// Input order is preserved inside each children list, so callers pass
/// nodes already sorted by position. Nodes whose parent is absent from the
/// input are unreachable and dropped.
fn build_forest(nodes: Vec<FeatureNode>) -> Vec<FeatureTreeNode> {
    let mut children_map: HashMap<Option<Uuid>, Vec<FeatureNode>> = HashMap::new();
    for node in nodes {
        children_map.entry(node.parent_id).or_default().push(node);
    }

    fn build_subtree(
        parent_id: Option<Uuid>,
        children_map: &mut HashMap<Option<Uuid>, Vec<FeatureNode>>,
    ) -> Vec<FeatureTreeNode> {
        let Some(nodes) = children_map.remove(&parent_id) else {
            return Vec::new();
        };
        nodes
            .into_iter()
            .map(|node| {
                let children = build_subtree(Some(node.id), children_map);
                FeatureTreeNode { node, children }
            })
            .collect()
    }

    build_subtree(None, &mut children_map)
}

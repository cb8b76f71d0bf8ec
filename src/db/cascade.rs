use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::{fetch_node, live_children, Database};
use crate::error::{TreeError, TreeResult};
use crate::models::*;

/// Attempts per ancestor before giving up on a contended rollup write.
const MAX_ROLLUP_ATTEMPTS: usize = 3;

impl Database {
    /// Write a node's status and propagate rollups to its ancestors.
    ///
    /// Writing the current status is a no-op. Otherwise each ancestor is
    /// recomputed from a fresh read of its live children, nearest first, and
    /// the walk stops at the first ancestor whose status does not change.
    pub fn update_status(
        &self,
        project_id: Uuid,
        node_id: Uuid,
        status: NodeStatus,
    ) -> TreeResult<StatusUpdateResult> {
        let conn = self.lock();
        let node = fetch_node(&conn, project_id, node_id, false)?
            .ok_or_else(|| TreeError::node_not_found(node_id))?;

        if node.status == status {
            return Ok(StatusUpdateResult {
                node,
                cascade_log: Vec::new(),
                cascade_complete: true,
            });
        }

        let now = Utc::now();
        let rows = conn.execute(
            "UPDATE feature_nodes SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            (status.as_str(), now.to_rfc3339(), node_id.to_string()),
        )?;
        if rows == 0 {
            return Err(TreeError::node_not_found(node_id));
        }

        tracing::debug!(
            node_id = %node_id,
            from = node.status.as_str(),
            to = status.as_str(),
            "Status written"
        );

        let (cascade_log, cascade_complete) = cascade_from(&conn, project_id, node.parent_id);

        Ok(StatusUpdateResult {
            node: FeatureNode {
                status,
                updated_at: now,
                ..node
            },
            cascade_log,
            cascade_complete,
        })
    }
}

enum Rollup {
    /// Stored status already matches the children.
    Unchanged,
    /// Ancestor missing or deleted; nothing above it is reachable.
    Detached,
    Changed {
        change: StatusChange,
        parent_id: Option<Uuid>,
    },
}

/// Walk upward from `start`, recomputing each ancestor's rollup.
///
/// Returns the changes applied, nearest first, and whether the walk ran to
/// its natural end. A failed write stops the walk; earlier writes stay.
pub(crate) fn cascade_from(
    conn: &Connection,
    project_id: Uuid,
    start: Option<Uuid>,
) -> (Vec<StatusChange>, bool) {
    let mut log = Vec::new();
    let mut current = start;

    while let Some(ancestor_id) = current {
        match recompute(conn, project_id, ancestor_id) {
            Ok(Rollup::Changed { change, parent_id }) => {
                tracing::debug!(
                    node_id = %change.node_id,
                    from = change.old_status.as_str(),
                    to = change.new_status.as_str(),
                    "Rollup changed"
                );
                log.push(change);
                current = parent_id;
            }
            Ok(Rollup::Unchanged) | Ok(Rollup::Detached) => break,
            Err(e) => {
                tracing::warn!(
                    node_id = %ancestor_id,
                    applied = log.len(),
                    "Status cascade interrupted: {}",
                    e
                );
                return (log, false);
            }
        }
    }

    (log, true)
}

/// Recompute one ancestor with a compare-and-swap on its stored status.
fn recompute(conn: &Connection, project_id: Uuid, ancestor_id: Uuid) -> TreeResult<Rollup> {
    for attempt in 1..=MAX_ROLLUP_ATTEMPTS {
        let Some(ancestor) = fetch_node(conn, project_id, ancestor_id, false)? else {
            return Ok(Rollup::Detached);
        };

        let statuses: Vec<NodeStatus> = live_children(conn, project_id, Some(ancestor_id))?
            .iter()
            .map(|child| child.status)
            .collect();
        let rolled_up = aggregate_status(&statuses);

        if rolled_up == ancestor.status {
            return Ok(Rollup::Unchanged);
        }

        let rows = conn.execute(
            "UPDATE feature_nodes SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status = ?4 AND deleted_at IS NULL",
            (
                rolled_up.as_str(),
                Utc::now().to_rfc3339(),
                ancestor_id.to_string(),
                ancestor.status.as_str(),
            ),
        )?;

        if rows == 1 {
            return Ok(Rollup::Changed {
                change: StatusChange {
                    node_id: ancestor_id,
                    old_status: ancestor.status,
                    new_status: rolled_up,
                },
                parent_id: ancestor.parent_id,
            });
        }

        tracing::debug!(node_id = %ancestor_id, attempt, "Rollup write lost a race, retrying");
    }

    Err(TreeError::Conflict(format!(
        "status of {} kept changing during rollup",
        ancestor_id
    )))
}

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use uuid::Uuid;

use super::{insert_node, next_position, require_project, Database};
use crate::error::BulkCreateError;
use crate::models::*;

impl Database {
    /// Persist a batch of placeholder-linked nodes as new subtrees.
    ///
    /// Entries are inserted breadth-first from the batch roots, so every
    /// parent exists before its children whatever order the batch lists
    /// them in. New roots are appended after the project's existing roots;
    /// children are numbered from 0 in batch order.
    ///
    /// Validation failures write nothing. A persistence failure stops the
    /// batch and reports what was already created; those rows are kept.
    pub fn bulk_create(
        &self,
        project_id: Uuid,
        input: BulkCreateInput,
    ) -> Result<BulkCreateResult, BulkCreateError> {
        validate_batch(&input.nodes).inspect_err(|e| {
            tracing::warn!(project_id = %project_id, "Rejected bulk batch: {}", e);
        })?;

        let conn = self.lock();
        require_project(&conn, project_id)?;

        let mut children_of: HashMap<Option<&str>, Vec<&BulkNodeInput>> = HashMap::new();
        for entry in &input.nodes {
            children_of
                .entry(entry.parent_temp_id.as_deref())
                .or_default()
                .push(entry);
        }

        let mut counters: HashMap<Option<&str>, i64> = HashMap::new();
        counters.insert(None, next_position(&conn, project_id, None)?);

        let mut id_map: HashMap<String, Uuid> = HashMap::with_capacity(input.nodes.len());
        let mut real_ids = Vec::with_capacity(input.nodes.len());
        let mut queue: VecDeque<Option<&str>> = VecDeque::from([None]);
        let now = Utc::now();

        while let Some(parent_key) = queue.pop_front() {
            let Some(entries) = children_of.get(&parent_key) else {
                continue;
            };
            let parent_id = parent_key.and_then(|key| id_map.get(key).copied());

            for &entry in entries {
                let counter = counters.entry(parent_key).or_insert(0);
                let position = *counter;
                *counter += 1;

                let node = FeatureNode {
                    id: Uuid::new_v4(),
                    project_id,
                    parent_id,
                    title: entry.title.trim().to_string(),
                    description: entry.description.clone(),
                    level: entry.level,
                    status: entry.status.unwrap_or(NodeStatus::NotStarted),
                    position,
                    deleted_at: None,
                    created_by: input.created_by.clone(),
                    origin_id: None,
                    created_at: now,
                    updated_at: now,
                };

                if let Err(source) = insert_node(&conn, &node) {
                    tracing::warn!(
                        project_id = %project_id,
                        created = real_ids.len(),
                        title = %entry.title,
                        "Bulk create stopped: {}",
                        source
                    );
                    return Err(BulkCreateError::Partial {
                        created_count: real_ids.len(),
                        failed_title: entry.title.clone(),
                        created_ids: real_ids,
                        source,
                    });
                }

                id_map.insert(entry.temp_id.clone(), node.id);
                real_ids.push(node.id);

                let key = Some(entry.temp_id.as_str());
                if children_of.contains_key(&key) {
                    queue.push_back(key);
                }
            }
        }

        tracing::info!(
            project_id = %project_id,
            created = real_ids.len(),
            "Bulk created nodes"
        );

        Ok(BulkCreateResult {
            created_count: real_ids.len(),
            real_ids,
            id_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;

    fn setup() -> (Database, Uuid) {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        let project = db
            .create_project(CreateProjectInput {
                name: "Bulk".to_string(),
                description: None,
            })
            .unwrap();
        (db, project.id)
    }

    fn entry(temp_id: &str, parent: Option<&str>, title: &str, level: NodeLevel) -> BulkNodeInput {
        BulkNodeInput {
            temp_id: temp_id.to_string(),
            parent_temp_id: parent.map(str::to_string),
            title: title.to_string(),
            description: None,
            level,
            status: None,
        }
    }

    #[test]
    fn persistence_failure_reports_partial_progress() {
        let (db, project_id) = setup();
        db.lock()
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON feature_nodes
                 WHEN NEW.title = 'Poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned title'); END;",
            )
            .unwrap();

        let result = db.bulk_create(
            project_id,
            BulkCreateInput {
                nodes: vec![
                    entry("a", None, "Epic A", NodeLevel::Epic),
                    entry("b", Some("a"), "Poison", NodeLevel::Feature),
                    entry("c", Some("a"), "Never", NodeLevel::Feature),
                ],
                created_by: None,
            },
        );

        match result {
            Err(BulkCreateError::Partial {
                created_count,
                failed_title,
                created_ids,
                source,
            }) => {
                assert_eq!(created_count, 1);
                assert_eq!(failed_title, "Poison");
                assert_eq!(created_ids.len(), 1);
                assert!(matches!(source, TreeError::Database(_)));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }

        // The epic that made it in is not rolled back
        let tree = db.get_tree(project_id).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node.title, "Epic A");
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn invalid_batch_writes_nothing() {
        let (db, project_id) = setup();
        let result = db.bulk_create(
            project_id,
            BulkCreateInput {
                nodes: vec![
                    entry("a", None, "Epic A", NodeLevel::Epic),
                    entry("b", Some("zzz"), "Orphan", NodeLevel::Feature),
                ],
                created_by: None,
            },
        );

        assert!(matches!(
            result,
            Err(BulkCreateError::Rejected(TreeError::Validation(_)))
        ));
        assert!(db.get_tree(project_id).unwrap().is_empty());
    }
}

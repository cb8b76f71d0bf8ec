use std::collections::HashMap;

use csv::{ReaderBuilder, Trim, Writer};
use serde::Deserialize;

use super::{check_size, resolve_level, temp_id};
use crate::error::{TreeError, TreeResult};
use crate::models::*;

/// Write one CSV row per node in pre-order.
pub(super) fn write(forest: &[FeatureTreeNode], include_descriptions: bool) -> TreeResult<String> {
    let mut wtr = Writer::from_writer(Vec::new());

    let mut header = vec!["id", "parent_id", "title", "level", "status", "position"];
    if include_descriptions {
        header.push("description");
    }
    wtr.write_record(&header)?;

    for tree_node in flatten_forest(forest) {
        let node = &tree_node.node;
        let mut record = vec![
            node.id.to_string(),
            node.parent_id.map(|id| id.to_string()).unwrap_or_default(),
            node.title.clone(),
            node.level.as_str().to_string(),
            node.status.as_str().to_string(),
            node.position.to_string(),
        ];
        if include_descriptions {
            record.push(node.description.clone().unwrap_or_default());
        }
        wtr.write_record(&record)?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| TreeError::Csv(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|e| TreeError::validation(e.to_string()))
}

/// A CSV row as read. Every column except `title` is optional.
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    title: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Trimmed value of a key column, `None` when blank.
fn key(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse CSV into a batch, linking rows through the `parent_id` column.
///
/// Rows keep file order. A `parent_id` must match another row's `id`.
/// Only headers and the `id`, `parent_id`, `level` and `status` columns are
/// trimmed; titles and descriptions are taken as written.
pub(super) fn parse(content: &str) -> TreeResult<Vec<BulkNodeInput>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::Headers)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<Row>().enumerate() {
        let row = record.map_err(|e| {
            TreeError::validation(format!("Malformed tabular import at row {}: {}", index + 1, e))
        })?;
        rows.push(row);
        check_size(rows.len())?;
    }

    let mut index_by_id: HashMap<String, usize> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        if let Some(id) = key(row.id.clone()) {
            if index_by_id.insert(id.clone(), index).is_some() {
                return Err(TreeError::validation(format!("Duplicate id '{}'", id)));
            }
        }
    }

    let mut parents: Vec<Option<usize>> = Vec::with_capacity(rows.len());
    for row in &rows {
        let parent = match key(row.parent_id.clone()) {
            Some(parent_id) => Some(*index_by_id.get(&parent_id).ok_or_else(|| {
                TreeError::validation(format!(
                    "Row '{}' references unknown parent_id '{}'",
                    row.title, parent_id
                ))
            })?),
            None => None,
        };
        parents.push(parent);
    }

    let mut out = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let level = match key(row.level) {
            Some(raw) => Some(NodeLevel::from_str(&raw).ok_or_else(|| {
                TreeError::validation(format!("Unknown level '{}'", raw))
            })?),
            None => None,
        };
        let status = match key(row.status) {
            Some(raw) => Some(NodeStatus::from_str(&raw).ok_or_else(|| {
                TreeError::validation(format!("Unknown status '{}'", raw))
            })?),
            None => None,
        };
        let depth = depth_of(index, &parents)?;

        out.push(BulkNodeInput {
            temp_id: temp_id(index),
            parent_temp_id: parents[index].map(temp_id),
            level: resolve_level(level, depth, &row.title)?,
            title: row.title,
            description: row.description.filter(|d| !d.is_empty()),
            status,
        });
    }

    Ok(out)
}

/// Number of ancestors of a row, failing on parent cycles.
fn depth_of(index: usize, parents: &[Option<usize>]) -> TreeResult<usize> {
    let mut depth = 0;
    let mut current = parents[index];
    while let Some(parent) = current {
        depth += 1;
        if depth > parents.len() {
            return Err(TreeError::validation("parent_id references form a cycle"));
        }
        current = parents[parent];
    }
    Ok(depth)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{check_size, resolve_level, temp_id};
use crate::error::{TreeError, TreeResult};
use crate::models::*;

/// Top-level structured export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub project_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub nodes: Vec<ExportedNode>,
}

/// One node of a structured export, with its children nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedNode {
    pub id: Uuid,
    pub title: String,
    pub level: NodeLevel,
    pub status: NodeStatus,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub children: Vec<ExportedNode>,
}

impl ExportDocument {
    pub fn new(project_id: Uuid, forest: &[FeatureTreeNode], include_descriptions: bool) -> Self {
        Self {
            project_id,
            exported_at: Utc::now(),
            nodes: forest
                .iter()
                .map(|root| ExportedNode::from_tree(root, include_descriptions))
                .collect(),
        }
    }
}

impl ExportedNode {
    fn from_tree(tree_node: &FeatureTreeNode, include_descriptions: bool) -> Self {
        let node = &tree_node.node;
        Self {
            id: node.id,
            title: node.title.clone(),
            level: node.level,
            status: node.status,
            position: node.position,
            description: if include_descriptions {
                node.description.clone()
            } else {
                None
            },
            children: tree_node
                .children
                .iter()
                .map(|child| Self::from_tree(child, include_descriptions))
                .collect(),
        }
    }
}

/// Lenient shape accepted on import; only `title` is required.
#[derive(Debug, Deserialize)]
struct IncomingNode {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    level: Option<NodeLevel>,
    #[serde(default)]
    status: Option<NodeStatus>,
    #[serde(default)]
    children: Vec<IncomingNode>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingDocument {
    Document { nodes: Vec<IncomingNode> },
    Bare(Vec<IncomingNode>),
}

pub(super) fn parse(content: &str) -> TreeResult<Vec<BulkNodeInput>> {
    let document: IncomingDocument = serde_json::from_str(content).map_err(|e| {
        TreeError::validation(format!("Malformed structured import: {}", e))
    })?;
    let roots = match document {
        IncomingDocument::Document { nodes } => nodes,
        IncomingDocument::Bare(nodes) => nodes,
    };

    let mut out = Vec::new();
    // Explicit stack keeps pre-order: push children reversed.
    let mut stack: Vec<(IncomingNode, Option<String>, usize)> =
        roots.into_iter().rev().map(|node| (node, None, 0)).collect();

    while let Some((node, parent_temp_id, depth)) = stack.pop() {
        check_size(out.len() + 1)?;

        let id = temp_id(out.len());
        let level = resolve_level(node.level, depth, &node.title)?;
        for child in node.children.into_iter().rev() {
            stack.push((child, Some(id.clone()), depth + 1));
        }

        out.push(BulkNodeInput {
            temp_id: id,
            parent_temp_id,
            title: node.title,
            description: node.description,
            level,
            status: node.status,
        });
    }

    Ok(out)
}

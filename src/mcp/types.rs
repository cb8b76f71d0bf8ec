//! Request and response types for MCP tools.

use std::collections::HashMap;

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateProjectRequest {
    #[schemars(description = "Project name")]
    pub name: String,
    #[schemars(description = "Optional description of what the project is for")]
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetFeatureTreeRequest {
    #[schemars(description = "The UUID of the project")]
    pub project_id: String,
    #[schemars(description = "Quote node descriptions under each line. Defaults to false.")]
    #[serde(default)]
    pub include_descriptions: bool,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct SearchNodesRequest {
    #[schemars(description = "The UUID of the project to search")]
    pub project_id: String,
    #[schemars(
        description = "Case-insensitive text matched against titles and descriptions. Omit to match everything."
    )]
    #[serde(default)]
    pub query: Option<String>,
    #[schemars(
        description = "Only match these statuses: not_started, in_progress, complete, blocked"
    )]
    #[serde(default)]
    pub statuses: Vec<String>,
    #[schemars(description = "Only match these levels: epic, feature, sub_feature, task")]
    #[serde(default)]
    pub levels: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateNodeStatusRequest {
    #[schemars(description = "The UUID of the project")]
    pub project_id: String,
    #[schemars(description = "The UUID of the node to update")]
    pub node_id: String,
    #[schemars(description = "New status: not_started, in_progress, complete, or blocked")]
    pub status: String,
}

/// One proposed node of a plan, linked to its parent by placeholder id.
///
/// The same shape is returned by `import_preview`, so a parsed import can
/// be passed straight to `plan_nodes`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedNode {
    #[schemars(description = "Placeholder id, unique within the plan (e.g. 'n1')")]
    pub temp_id: String,
    #[schemars(description = "Placeholder id of the parent; omit for epics")]
    #[serde(default)]
    pub parent_temp_id: Option<String>,
    #[schemars(description = "Short title of the node")]
    pub title: String,
    #[schemars(description = "Optional longer description")]
    #[serde(default)]
    pub description: Option<String>,
    #[schemars(
        description = "Level: epic (roots), feature, sub_feature, or task. Each child is exactly one level below its parent."
    )]
    pub level: String,
    #[schemars(description = "Initial status. Defaults to not_started.")]
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanNodesRequest {
    #[schemars(description = "The UUID of the project to add the nodes to")]
    pub project_id: String,
    #[schemars(description = "Proposed nodes, at most 200, in any order")]
    pub nodes: Vec<PlannedNode>,
    #[schemars(
        description = "Set to true to create the nodes. Defaults to false, which only validates and echoes the plan."
    )]
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExportTreeRequest {
    #[schemars(description = "The UUID of the project to export")]
    pub project_id: String,
    #[schemars(description = "Format: structured (JSON, default), outline, or tabular (CSV)")]
    #[serde(default)]
    pub format: Option<String>,
    #[schemars(description = "Include node descriptions. Defaults to false.")]
    #[serde(default)]
    pub include_descriptions: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImportPreviewRequest {
    #[schemars(description = "The document to parse, as exported by export_tree")]
    pub content: String,
    #[schemars(description = "Format of the content: structured (default) or tabular")]
    #[serde(default)]
    pub format: Option<String>,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectInfo>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StatusChangeInfo {
    pub node_id: String,
    pub old_status: String,
    pub new_status: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateNodeStatusResponse {
    pub node_id: String,
    pub title: String,
    pub status: String,
    /// Ancestors rewritten by the rollup, nearest first.
    pub cascade: Vec<StatusChangeInfo>,
    /// False when an ancestor could not be recomputed; re-read the tree.
    pub cascade_complete: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PlanNodesResponse {
    pub proposed_nodes: Vec<PlannedNode>,
    pub created: bool,
    pub created_count: usize,
    /// Placeholder id to real node id, empty when not created.
    pub id_map: HashMap<String, String>,
}

//! MCP server for AI agents that plan and track work in a feature tree.

mod types;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{BulkCreateError, TreeError};
use crate::models::*;
use crate::serialize::{self, render_outline, ExportFormat, ImportFormat};

#[derive(Clone)]
pub struct McpServer {
    db: Database,
    tool_router: ToolRouter<Self>,
}

fn parse_uuid(s: &str) -> Result<Uuid, McpError> {
    Uuid::parse_str(s).map_err(|e| McpError::invalid_params(format!("Invalid UUID: {}", e), None))
}

/// Caller mistakes become `invalid_params`; everything else is internal.
fn mcp_error(e: TreeError) -> McpError {
    match e {
        TreeError::Validation(_) | TreeError::NotFound { .. } => {
            McpError::invalid_params(e.to_string(), None)
        }
        other => {
            tracing::error!("MCP tool failed: {}", other);
            McpError::internal_error(other.to_string(), None)
        }
    }
}

fn parse_status(s: &str) -> Result<NodeStatus, McpError> {
    NodeStatus::from_str(s).ok_or_else(|| {
        McpError::invalid_params(
            format!(
                "Invalid status '{}'. Must be: not_started, in_progress, complete, or blocked",
                s
            ),
            None,
        )
    })
}

fn parse_level(s: &str) -> Result<NodeLevel, McpError> {
    NodeLevel::from_str(s).ok_or_else(|| {
        McpError::invalid_params(
            format!(
                "Invalid level '{}'. Must be: epic, feature, sub_feature, or task",
                s
            ),
            None,
        )
    })
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

impl PlannedNode {
    fn into_bulk(self) -> Result<BulkNodeInput, McpError> {
        Ok(BulkNodeInput {
            level: parse_level(&self.level)?,
            status: self.status.as_deref().map(parse_status).transpose()?,
            temp_id: self.temp_id,
            parent_temp_id: self.parent_temp_id,
            title: self.title,
            description: self.description,
        })
    }
}

impl From<BulkNodeInput> for PlannedNode {
    fn from(node: BulkNodeInput) -> Self {
        Self {
            temp_id: node.temp_id,
            parent_temp_id: node.parent_temp_id,
            title: node.title,
            description: node.description,
            level: node.level.as_str().to_string(),
            status: node.status.map(|s| s.as_str().to_string()),
        }
    }
}

impl From<Project> for ProjectInfo {
    fn from(project: Project) -> Self {
        Self {
            id: project.id.to_string(),
            name: project.name,
            description: project.description,
        }
    }
}

impl McpServer {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            tool_router: Self::tool_router(),
        }
    }

    fn list_projects_response(&self) -> Result<ProjectListResponse, McpError> {
        let projects = self.db.get_all_projects().map_err(mcp_error)?;
        Ok(ProjectListResponse {
            projects: projects.into_iter().map(ProjectInfo::from).collect(),
        })
    }

    fn create_project_response(&self, req: CreateProjectRequest) -> Result<ProjectInfo, McpError> {
        self.db
            .create_project(CreateProjectInput {
                name: req.name,
                description: req.description,
            })
            .map(ProjectInfo::from)
            .map_err(mcp_error)
    }

    fn outline(&self, req: GetFeatureTreeRequest) -> Result<String, McpError> {
        let project_id = parse_uuid(&req.project_id)?;
        let forest = self.db.get_tree(project_id).map_err(mcp_error)?;
        if forest.is_empty() {
            return Ok("Project has no nodes.".to_string());
        }
        Ok(render_outline(&forest, req.include_descriptions))
    }

    fn search_response(&self, req: SearchNodesRequest) -> Result<SearchResult, McpError> {
        let project_id = parse_uuid(&req.project_id)?;
        let query = SearchQuery {
            query: req.query,
            statuses: req
                .statuses
                .iter()
                .map(|s| parse_status(s))
                .collect::<Result<_, _>>()?,
            levels: req
                .levels
                .iter()
                .map(|s| parse_level(s))
                .collect::<Result<_, _>>()?,
        };
        self.db.search(project_id, &query).map_err(mcp_error)
    }

    fn status_response(
        &self,
        req: UpdateNodeStatusRequest,
    ) -> Result<UpdateNodeStatusResponse, McpError> {
        let project_id = parse_uuid(&req.project_id)?;
        let node_id = parse_uuid(&req.node_id)?;
        let status = parse_status(&req.status)?;

        let result = self
            .db
            .update_status(project_id, node_id, status)
            .map_err(mcp_error)?;

        Ok(UpdateNodeStatusResponse {
            node_id: result.node.id.to_string(),
            title: result.node.title,
            status: result.node.status.as_str().to_string(),
            cascade: result
                .cascade_log
                .into_iter()
                .map(|c| StatusChangeInfo {
                    node_id: c.node_id.to_string(),
                    old_status: c.old_status.as_str().to_string(),
                    new_status: c.new_status.as_str().to_string(),
                })
                .collect(),
            cascade_complete: result.cascade_complete,
        })
    }

    fn plan_response(&self, req: PlanNodesRequest) -> Result<PlanNodesResponse, McpError> {
        let project_id = parse_uuid(&req.project_id)?;

        self.db
            .get_project(project_id)
            .map_err(mcp_error)?
            .ok_or_else(|| McpError::invalid_params("Project not found", None))?;

        let batch = req
            .nodes
            .iter()
            .cloned()
            .map(PlannedNode::into_bulk)
            .collect::<Result<Vec<_>, _>>()?;

        if !req.confirm {
            validate_batch(&batch).map_err(mcp_error)?;
            return Ok(PlanNodesResponse {
                proposed_nodes: req.nodes,
                created: false,
                created_count: 0,
                id_map: Default::default(),
            });
        }

        let result = self
            .db
            .bulk_create(
                project_id,
                BulkCreateInput {
                    nodes: batch,
                    created_by: Some("mcp".to_string()),
                },
            )
            .map_err(|e| match e {
                BulkCreateError::Rejected(e) => mcp_error(e),
                BulkCreateError::Partial {
                    created_count,
                    failed_title,
                    source,
                    ..
                } => {
                    tracing::error!(created_count, "Plan partially created: {}", source);
                    McpError::internal_error(
                        format!(
                            "Created {} nodes before '{}' failed; re-read the tree before retrying",
                            created_count, failed_title
                        ),
                        Some(serde_json::json!({
                            "created_count": created_count,
                            "failed_title": failed_title,
                        })),
                    )
                }
            })?;

        Ok(PlanNodesResponse {
            proposed_nodes: req.nodes,
            created: true,
            created_count: result.created_count,
            id_map: result
                .id_map
                .into_iter()
                .map(|(temp, real)| (temp, real.to_string()))
                .collect(),
        })
    }

    fn export_document(&self, req: ExportTreeRequest) -> Result<String, McpError> {
        let project_id = parse_uuid(&req.project_id)?;
        let format = match req.format.as_deref() {
            None => ExportFormat::Structured,
            Some(raw) => ExportFormat::from_str(raw).ok_or_else(|| {
                McpError::invalid_params(
                    format!(
                        "Invalid format '{}'. Must be: structured, outline, or tabular",
                        raw
                    ),
                    None,
                )
            })?,
        };
        self.db
            .export(project_id, format, req.include_descriptions)
            .map_err(mcp_error)
    }

    fn import_nodes(&self, req: ImportPreviewRequest) -> Result<Vec<PlannedNode>, McpError> {
        let format = match req.format.as_deref() {
            None => ImportFormat::Structured,
            Some(raw) => ImportFormat::from_str(raw).ok_or_else(|| {
                McpError::invalid_params(
                    format!("Invalid format '{}'. Must be: structured or tabular", raw),
                    None,
                )
            })?,
        };
        let nodes = serialize::import(&req.content, format).map_err(mcp_error)?;
        Ok(nodes.into_iter().map(PlannedNode::from).collect())
    }

    // ============================================================
    // Test helpers - expose tool logic for testing
    // ============================================================

    pub fn test_list_projects(&self) -> Result<ProjectListResponse, McpError> {
        self.list_projects_response()
    }

    pub fn test_create_project(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ProjectInfo, McpError> {
        self.create_project_response(CreateProjectRequest {
            name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    pub fn test_get_feature_tree(
        &self,
        project_id: &str,
        include_descriptions: bool,
    ) -> Result<String, McpError> {
        self.outline(GetFeatureTreeRequest {
            project_id: project_id.to_string(),
            include_descriptions,
        })
    }

    pub fn test_search_nodes(&self, req: SearchNodesRequest) -> Result<SearchResult, McpError> {
        self.search_response(req)
    }

    pub fn test_update_node_status(
        &self,
        project_id: &str,
        node_id: &str,
        status: &str,
    ) -> Result<UpdateNodeStatusResponse, McpError> {
        self.status_response(UpdateNodeStatusRequest {
            project_id: project_id.to_string(),
            node_id: node_id.to_string(),
            status: status.to_string(),
        })
    }

    pub fn test_plan_nodes(
        &self,
        project_id: &str,
        nodes: Vec<PlannedNode>,
        confirm: bool,
    ) -> Result<PlanNodesResponse, McpError> {
        self.plan_response(PlanNodesRequest {
            project_id: project_id.to_string(),
            nodes,
            confirm,
        })
    }

    pub fn test_export_tree(
        &self,
        project_id: &str,
        format: Option<&str>,
        include_descriptions: bool,
    ) -> Result<String, McpError> {
        self.export_document(ExportTreeRequest {
            project_id: project_id.to_string(),
            format: format.map(str::to_string),
            include_descriptions,
        })
    }

    pub fn test_import_preview(
        &self,
        content: &str,
        format: Option<&str>,
    ) -> Result<Vec<PlannedNode>, McpError> {
        self.import_nodes(ImportPreviewRequest {
            content: content.to_string(),
            format: format.map(str::to_string),
        })
    }
}

#[tool_router]
impl McpServer {
    // ============================================================
    // Project Tools
    // ============================================================

    #[tool(
        description = "List all projects. Returns id, name, and description for each. Use the id with the other tools."
    )]
    async fn list_projects(&self) -> Result<CallToolResult, McpError> {
        json_result(&self.list_projects_response()?)
    }

    #[tool(
        description = "Create a new project to hold a feature tree. Returns the project with its id."
    )]
    async fn create_project(
        &self,
        params: Parameters<CreateProjectRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.create_project_response(params.0)?)
    }

    // ============================================================
    // Tree Tools
    // ============================================================

    #[tool(
        description = "Show a project's feature tree as an indented outline. Each line has a status symbol (○ not started, ◐ in progress, ● complete, ✗ blocked), the level, the title, and the status. Call this FIRST to understand the current plan before changing it."
    )]
    async fn get_feature_tree(
        &self,
        params: Parameters<GetFeatureTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let outline = self.outline(params.0)?;
        Ok(CallToolResult::success(vec![Content::text(outline)]))
    }

    #[tool(
        description = "Search a project's tree by text, status, and level. All filters are combined with AND. Returns matching_ids (the nodes that match), display_ids (matches plus every ancestor, in tree order, for showing context), and counts per status and level over the whole tree."
    )]
    async fn search_nodes(
        &self,
        params: Parameters<SearchNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.search_response(params.0)?)
    }

    #[tool(
        description = "Set a node's status. Parents roll up automatically: a parent is blocked if any child is blocked, complete if all children are complete, not started if none have started, and in progress otherwise. Returns the ancestors that changed. If cascade_complete is false, an ancestor could not be updated; re-read the tree."
    )]
    async fn update_node_status(
        &self,
        params: Parameters<UpdateNodeStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.status_response(params.0)?)
    }

    #[tool(
        description = "Plan and optionally create many nodes at once. Link nodes with temp_id and parent_temp_id; order does not matter. Roots must be epics and each child exactly one level below its parent (epic > feature > sub_feature > task). With confirm=false (default), validates and returns the plan for user review. With confirm=true, creates every node and returns the temp_id to id map."
    )]
    async fn plan_nodes(
        &self,
        params: Parameters<PlanNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.plan_response(params.0)?)
    }

    // ============================================================
    // Exchange Tools
    // ============================================================

    #[tool(
        description = "Export a project's live tree. Formats: structured (nested JSON), outline (indented text), tabular (CSV with a parent_id column)."
    )]
    async fn export_tree(
        &self,
        params: Parameters<ExportTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let document = self.export_document(params.0)?;
        Ok(CallToolResult::success(vec![Content::text(document)]))
    }

    #[tool(
        description = "Parse a structured or tabular export into a list of planned nodes without writing anything. Pass the result to plan_nodes with confirm=true to create them."
    )]
    async fn import_preview(
        &self,
        params: Parameters<ImportPreviewRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.import_nodes(params.0)?)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "feature-tree".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"Feature Tree tracks a project's work as a tree: epic > feature > sub_feature > task.

STATUS:
- Statuses are not_started, in_progress, complete, blocked.
- Set status on the nodes you work on, usually tasks. Parents roll up on their own:
  blocked if any child is blocked, complete if all are complete,
  not_started if none have started, in_progress otherwise.

PLANNING:
1. Call list_projects (or create_project) to get a project_id
2. Call get_feature_tree to see what already exists
3. Call plan_nodes with confirm=false and show the plan to the user
4. Call plan_nodes again with confirm=true once the user agrees

TRACKING:
- search_nodes finds nodes by text, status, or level
- update_node_status records progress

MOVING TREES:
- export_tree writes structured JSON, an outline, or CSV
- import_preview parses an export back into a plan for plan_nodes"#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(db: Database) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(db);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{BulkCreateError, TreeError};
use crate::models::*;
use crate::serialize::{self, ExportFormat, ImportFormat};

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Map an engine error to a response.
///
/// Validation and lookup failures are safe to show to the client. Anything
/// else is logged in full server-side and returned as a generic message.
fn api_error(e: TreeError) -> (StatusCode, String) {
    match e {
        TreeError::Validation(msg) => {
            tracing::warn!("Validation error: {}", msg);
            (StatusCode::BAD_REQUEST, msg)
        }
        TreeError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        TreeError::Conflict(_) => (StatusCode::CONFLICT, e.to_string()),
        other => {
            tracing::error!("Internal error: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

/// Malformed JSON bodies (including unknown level/status values) are 400s.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| api_error(TreeError::validation(rejection.body_text())))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(State(db): State<Database>) -> ApiResult<Json<Vec<Project>>> {
    db.get_all_projects().map(Json).map_err(api_error)
}

pub async fn get_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    db.get_project(id)
        .map_err(api_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
}

pub async fn create_project(
    State(db): State<Database>,
    payload: Result<Json<CreateProjectInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let input = body(payload)?;
    db.create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(api_error)
}

// ============================================================
// Tree
// ============================================================

pub async fn get_tree(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<FeatureTreeNode>>> {
    db.get_tree(project_id).map(Json).map_err(api_error)
}

/// Query parameters for exporting a tree.
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// `structured`, `outline` or `tabular`. Defaults to `structured`.
    pub format: Option<String>,
    #[serde(default)]
    pub include_descriptions: bool,
}

pub async fn export_tree(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let format = match query.format.as_deref() {
        None => ExportFormat::Structured,
        Some(raw) => ExportFormat::from_str(raw).ok_or_else(|| {
            api_error(TreeError::validation(format!("Unknown export format '{}'", raw)))
        })?,
    };

    let document = db
        .export(project_id, format, query.include_descriptions)
        .map_err(api_error)?;

    Ok(([(header::CONTENT_TYPE, format.content_type())], document).into_response())
}

// ============================================================
// Nodes
// ============================================================

pub async fn create_node(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
    payload: Result<Json<CreateNodeInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeatureNode>)> {
    let input = body(payload)?;
    db.create_node(project_id, input)
        .map(|n| (StatusCode::CREATED, Json(n)))
        .map_err(api_error)
}

pub async fn get_node(
    State(db): State<Database>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<FeatureNode>> {
    db.get_node(project_id, node_id)
        .map_err(api_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Node not found".to_string()))
}

pub async fn list_children(
    State(db): State<Database>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<FeatureNode>>> {
    db.get_children(project_id, node_id)
        .map(Json)
        .map_err(api_error)
}

pub async fn update_node(
    State(db): State<Database>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
    payload: Result<Json<UpdateNodeInput>, JsonRejection>,
) -> ApiResult<Json<FeatureNode>> {
    let input = body(payload)?;
    db.update_node(project_id, node_id, input)
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_node(
    State(db): State<Database>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    db.delete_node(project_id, node_id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

pub async fn restore_node(
    State(db): State<Database>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<FeatureNode>> {
    db.restore_node(project_id, node_id)
        .map(Json)
        .map_err(api_error)
}

pub async fn update_status(
    State(db): State<Database>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
    payload: Result<Json<UpdateStatusInput>, JsonRejection>,
) -> ApiResult<Json<StatusUpdateResult>> {
    let input = body(payload)?;
    db.update_status(project_id, node_id, input.status)
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Bulk creation
// ============================================================

/// Create a batch of placeholder-linked nodes.
///
/// A mid-batch failure returns 500 with the number of nodes already
/// created and the title that failed, so callers can re-read the tree.
pub async fn bulk_create(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
    payload: Result<Json<BulkCreateInput>, JsonRejection>,
) -> Result<(StatusCode, Json<BulkCreateResult>), Response> {
    let input = body(payload).map_err(IntoResponse::into_response)?;

    match db.bulk_create(project_id, input) {
        Ok(result) => Ok((StatusCode::CREATED, Json(result))),
        Err(BulkCreateError::Rejected(e)) => Err(api_error(e).into_response()),
        Err(BulkCreateError::Partial {
            created_count,
            failed_title,
            created_ids,
            source,
        }) => {
            tracing::error!(
                created_count,
                failed_title = %failed_title,
                "Bulk create partially applied: {}",
                source
            );
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Bulk create stopped before completion",
                    "created_count": created_count,
                    "failed_title": failed_title,
                    "created_ids": created_ids,
                })),
            )
                .into_response())
        }
    }
}

// ============================================================
// Search
// ============================================================

/// Query parameters for searching a tree.
#[derive(Debug, Deserialize)]
pub struct SearchNodesQuery {
    /// Case-insensitive text matched against title and description.
    pub q: Option<String>,
    /// Comma-separated statuses, e.g. `in_progress,blocked`.
    pub status: Option<String>,
    /// Comma-separated levels, e.g. `feature,task`.
    pub level: Option<String>,
}

fn parse_list<T>(
    raw: Option<&str>,
    kind: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, TreeError> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            parse(s).ok_or_else(|| TreeError::validation(format!("Unknown {} '{}'", kind, s)))
        })
        .collect()
}

pub async fn search_nodes(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<SearchNodesQuery>,
) -> ApiResult<Json<SearchResult>> {
    let search = SearchQuery {
        query: query.q,
        statuses: parse_list(query.status.as_deref(), "status", NodeStatus::from_str)
            .map_err(api_error)?,
        levels: parse_list(query.level.as_deref(), "level", NodeLevel::from_str)
            .map_err(api_error)?,
    };

    db.search(project_id, &search).map(Json).map_err(api_error)
}

// ============================================================
// Import preview
// ============================================================

/// Query parameters for import.
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    /// `structured` or `tabular`. Defaults to `structured`.
    pub format: Option<String>,
}

/// Parse an uploaded document into a batch for review. Nothing is written.
pub async fn import_preview(
    Query(query): Query<ImportQuery>,
    content: String,
) -> ApiResult<Json<Vec<BulkNodeInput>>> {
    let format = match query.format.as_deref() {
        None => ImportFormat::Structured,
        Some(raw) => ImportFormat::from_str(raw).ok_or_else(|| {
            api_error(TreeError::validation(format!("Unknown import format '{}'", raw)))
        })?,
    };

    serialize::import(&content, format)
        .map(Json)
        .map_err(api_error)
}

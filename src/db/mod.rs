mod bulk;
mod cascade;
mod nodes;
mod schema;
mod search;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{TreeError, TreeResult};
use crate::models::*;

/// Shared handle to the SQLite store.
///
/// Cloning is cheap; all clones share one connection. Each public operation
/// holds the connection lock for its whole duration, so operations issued
/// through the same handle never interleave.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_db_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> TreeResult<Vec<Project>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects ORDER BY name",
        )?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> TreeResult<Option<Project>> {
        let conn = self.lock();
        let project = conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at
                 FROM projects WHERE id = ?",
                [id.to_string()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> TreeResult<Project> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(TreeError::validation("Project name must not be empty"));
        }

        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                name,
                &input.description,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        tracing::info!(project_id = %id, "Created project");

        Ok(Project {
            id,
            name: name.to_string(),
            description: input.description,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// Location of the database when no explicit path is configured.
pub fn default_db_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "feature-tree")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("feature-tree.db"))
}

// ============================================================
// Row helpers shared by the operation modules
// ============================================================

const NODE_COLUMNS: &str = "id, project_id, parent_id, title, description, level, status, \
     position, deleted_at, created_by, origin_id, created_at, updated_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<FeatureNode> {
    let level: String = row.get(5)?;
    let status: String = row.get(6)?;
    Ok(FeatureNode {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        parent_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
        title: row.get(3)?,
        description: row.get(4)?,
        level: NodeLevel::from_str(&level).ok_or_else(|| bad_column(5, "level", &level))?,
        status: NodeStatus::from_str(&status).ok_or_else(|| bad_column(6, "status", &status))?,
        position: row.get(7)?,
        deleted_at: row.get::<_, Option<String>>(8)?.map(parse_datetime),
        created_by: row.get(9)?,
        origin_id: row.get::<_, Option<String>>(10)?.map(parse_uuid),
        created_at: parse_datetime(row.get::<_, String>(11)?),
        updated_at: parse_datetime(row.get::<_, String>(12)?),
    })
}

fn bad_column(idx: usize, name: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("invalid {} value: {}", name, value).into(),
    )
}

fn require_project(conn: &Connection, project_id: Uuid) -> TreeResult<()> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM projects WHERE id = ?",
        [project_id.to_string()],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(TreeError::project_not_found(project_id));
    }
    Ok(())
}

/// Fetch a node in the project. Soft-deleted rows are returned only when asked.
fn fetch_node(
    conn: &Connection,
    project_id: Uuid,
    id: Uuid,
    include_deleted: bool,
) -> TreeResult<Option<FeatureNode>> {
    let sql = format!(
        "SELECT {} FROM feature_nodes WHERE id = ?1 AND project_id = ?2{}",
        NODE_COLUMNS,
        if include_deleted {
            ""
        } else {
            " AND deleted_at IS NULL"
        }
    );
    let node = conn
        .query_row(
            &sql,
            (id.to_string(), project_id.to_string()),
            node_from_row,
        )
        .optional()?;
    Ok(node)
}

/// All live nodes of a project, in sibling order.
fn live_nodes(conn: &Connection, project_id: Uuid) -> TreeResult<Vec<FeatureNode>> {
    let sql = format!(
        "SELECT {} FROM feature_nodes
         WHERE project_id = ? AND deleted_at IS NULL
         ORDER BY position, created_at",
        NODE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let nodes = stmt
        .query_map([project_id.to_string()], node_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(nodes)
}

/// Live children of `parent_id` (`None` for roots), in sibling order.
fn live_children(
    conn: &Connection,
    project_id: Uuid,
    parent_id: Option<Uuid>,
) -> TreeResult<Vec<FeatureNode>> {
    let sql = format!(
        "SELECT {} FROM feature_nodes
         WHERE project_id = ?1 AND parent_id IS ?2 AND deleted_at IS NULL
         ORDER BY position, created_at",
        NODE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let nodes = stmt
        .query_map(
            (project_id.to_string(), parent_id.map(|u| u.to_string())),
            node_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(nodes)
}

/// Position for a node appended under `parent_id`: live max + 1, or 0.
fn next_position(conn: &Connection, project_id: Uuid, parent_id: Option<Uuid>) -> TreeResult<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM feature_nodes
         WHERE project_id = ?1 AND parent_id IS ?2 AND deleted_at IS NULL",
        (project_id.to_string(), parent_id.map(|u| u.to_string())),
        |row| row.get(0),
    )?;
    Ok(max.map_or(0, |m| m + 1))
}

fn insert_node(conn: &Connection, node: &FeatureNode) -> TreeResult<()> {
    conn.execute(
        "INSERT INTO feature_nodes (id, project_id, parent_id, title, description, level, status,
                                    position, deleted_at, created_by, origin_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?)",
        rusqlite::params![
            node.id.to_string(),
            node.project_id.to_string(),
            node.parent_id.map(|u| u.to_string()),
            &node.title,
            &node.description,
            node.level.as_str(),
            node.status.as_str(),
            node.position,
            &node.created_by,
            node.origin_id.map(|u| u.to_string()),
            node.created_at.to_rfc3339(),
            node.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

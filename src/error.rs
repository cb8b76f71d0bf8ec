//! Error types for tree operations.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the node store, cascade, search and serializer.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Input rejected before any write.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// An optimistic status write kept losing to concurrent writers.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TreeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn project_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "Project",
            id,
        }
    }

    pub fn node_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Node", id }
    }

    pub fn parent_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "Parent node",
            id,
        }
    }
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Errors from bulk creation, which is the one non-atomic operation.
#[derive(Debug, Error)]
pub enum BulkCreateError {
    /// The batch was rejected up front; nothing was written.
    #[error(transparent)]
    Rejected(#[from] TreeError),

    /// Persistence failed mid-batch. Rows created so far are kept.
    #[error("Bulk create stopped after {created_count} nodes while inserting \"{failed_title}\": {source}")]
    Partial {
        created_count: usize,
        failed_title: String,
        created_ids: Vec<Uuid>,
        #[source]
        source: TreeError,
    },
}

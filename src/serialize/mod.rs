//! Export of a project's tree and import of external trees.
//!
//! Exports render the live, position-sorted forest. Imports never touch the
//! database: they parse content into a [`BulkNodeInput`] batch that callers
//! review and then hand to [`Database::bulk_create`].

mod outline;
mod structured;
mod tabular;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{TreeError, TreeResult};
use crate::models::*;

pub use outline::render_outline;
pub use structured::{ExportDocument, ExportedNode};

/// Output format for [`Database::export`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Nested JSON document.
    Structured,
    /// Indented plain text, one line per node.
    Outline,
    /// CSV, one row per node with a `parent_id` column.
    Tabular,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Outline => "outline",
            Self::Tabular => "tabular",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "structured" | "json" => Some(Self::Structured),
            "outline" | "text" => Some(Self::Outline),
            "tabular" | "csv" => Some(Self::Tabular),
            _ => None,
        }
    }

    /// MIME type for HTTP responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Structured => "application/json",
            Self::Outline => "text/plain; charset=utf-8",
            Self::Tabular => "text/csv; charset=utf-8",
        }
    }
}

/// Input format for [`import`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportFormat {
    Structured,
    Tabular,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Tabular => "tabular",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "structured" | "json" => Some(Self::Structured),
            "tabular" | "csv" => Some(Self::Tabular),
            _ => None,
        }
    }
}

impl Database {
    /// Render the project's live tree in the requested format.
    pub fn export(
        &self,
        project_id: Uuid,
        format: ExportFormat,
        include_descriptions: bool,
    ) -> TreeResult<String> {
        let forest = self.get_tree(project_id)?;

        tracing::debug!(
            project_id = %project_id,
            format = format.as_str(),
            "Exporting tree"
        );

        match format {
            ExportFormat::Structured => {
                let document = ExportDocument::new(project_id, &forest, include_descriptions);
                Ok(serde_json::to_string_pretty(&document)?)
            }
            ExportFormat::Outline => Ok(render_outline(&forest, include_descriptions)),
            ExportFormat::Tabular => tabular::write(&forest, include_descriptions),
        }
    }
}

/// Parse exported content into a bulk batch for preview.
///
/// Placeholder ids are synthesized (`n1`, `n2`, …) in pre-order, so sibling
/// order follows the document. Missing levels are inferred from depth. The
/// returned batch has already passed [`validate_batch`].
pub fn import(content: &str, format: ImportFormat) -> TreeResult<Vec<BulkNodeInput>> {
    let nodes = match format {
        ImportFormat::Structured => structured::parse(content)?,
        ImportFormat::Tabular => tabular::parse(content)?,
    };

    validate_batch(&nodes)?;

    tracing::debug!(
        format = format.as_str(),
        entries = nodes.len(),
        "Parsed import preview"
    );

    Ok(nodes)
}

fn temp_id(index: usize) -> String {
    format!("n{}", index + 1)
}

/// Level for an imported entry: explicit when given, else from depth.
fn resolve_level(explicit: Option<NodeLevel>, depth: usize, title: &str) -> TreeResult<NodeLevel> {
    match explicit {
        Some(level) => Ok(level),
        None => NodeLevel::at_depth(depth).ok_or_else(|| {
            TreeError::validation(format!(
                "'{}' is nested deeper than the task level",
                title
            ))
        }),
    }
}

fn check_size(count: usize) -> TreeResult<()> {
    if count > MAX_BATCH_SIZE {
        return Err(TreeError::validation(format!(
            "Import has more than {} entries",
            MAX_BATCH_SIZE
        )));
    }
    Ok(())
}

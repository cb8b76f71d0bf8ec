use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single node in a project's work-decomposition tree.
///
/// Nodes are linked to their parent by `parent_id` only; nested views are
/// rebuilt in memory (see [`FeatureTreeNode`]). The node's `level` is fixed by
/// its position in the hierarchy and never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureNode {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub level: NodeLevel,
    pub status: NodeStatus,
    /// Sibling order. Unique among live siblings, never renumbered.
    pub position: i64,
    /// Set when the node is soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    /// Weak reference to the idea this node was promoted from, if any.
    pub origin_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureNode {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Depth of a node in the decomposition ladder.
///
/// The ladder is strictly ordered: a root is always an `Epic`, each child is
/// exactly one step below its parent, and a `Task` cannot have children.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeLevel {
    Epic,
    Feature,
    SubFeature,
    Task,
}

impl NodeLevel {
    pub const ALL: [NodeLevel; 4] = [
        NodeLevel::Epic,
        NodeLevel::Feature,
        NodeLevel::SubFeature,
        NodeLevel::Task,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::SubFeature => "sub_feature",
            Self::Task => "task",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "epic" => Some(Self::Epic),
            "feature" => Some(Self::Feature),
            "sub_feature" => Some(Self::SubFeature),
            "task" => Some(Self::Task),
            _ => None,
        }
    }

    /// Human-readable label used in outline exports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Epic => "Epic",
            Self::Feature => "Feature",
            Self::SubFeature => "Sub-feature",
            Self::Task => "Task",
        }
    }

    /// Zero-based depth in the ladder.
    pub fn depth(&self) -> usize {
        match self {
            Self::Epic => 0,
            Self::Feature => 1,
            Self::SubFeature => 2,
            Self::Task => 3,
        }
    }

    /// The level a child of this level must have. `None` for tasks.
    pub fn child_level(&self) -> Option<Self> {
        Self::ALL.get(self.depth() + 1).copied()
    }

    /// The level of a node at the given depth, if the ladder reaches that far.
    pub fn at_depth(depth: usize) -> Option<Self> {
        Self::ALL.get(depth).copied()
    }
}

/// Progress status of a node.
///
/// Any node may have its status written directly, but a parent's status is
/// recomputed from its children whenever one of them changes (see
/// [`aggregate_status`]).
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    InProgress,
    Complete,
    Blocked,
}

impl NodeStatus {
    pub const ALL: [NodeStatus; 4] = [
        NodeStatus::NotStarted,
        NodeStatus::InProgress,
        NodeStatus::Complete,
        NodeStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// Roll up the statuses of a parent's direct, live children.
///
/// Precedence: no children → not started; all complete → complete; any
/// blocked → blocked; any started or complete → in progress; else not started.
pub fn aggregate_status(children: &[NodeStatus]) -> NodeStatus {
    if children.is_empty() {
        return NodeStatus::NotStarted;
    }
    if children.iter().all(|s| *s == NodeStatus::Complete) {
        return NodeStatus::Complete;
    }
    if children.contains(&NodeStatus::Blocked) {
        return NodeStatus::Blocked;
    }
    if children
        .iter()
        .any(|s| matches!(s, NodeStatus::InProgress | NodeStatus::Complete))
    {
        return NodeStatus::InProgress;
    }
    NodeStatus::NotStarted
}

/// Input for creating a single node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNodeInput {
    /// Parent node. `None` creates a root epic.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub origin_id: Option<Uuid>,
}

/// Input for editing a node's text. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNodeInput {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Input for a direct status write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusInput {
    pub status: NodeStatus,
}

/// One ancestor whose status changed during a cascade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange {
    pub node_id: Uuid,
    pub old_status: NodeStatus,
    pub new_status: NodeStatus,
}

/// Result of [`update_status`](crate::db::Database::update_status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateResult {
    pub node: FeatureNode,
    /// Ancestors rewritten by the cascade, nearest first.
    pub cascade_log: Vec<StatusChange>,
    /// False when the walk stopped early on a persistence failure.
    pub cascade_complete: bool,
}

/// A node with its nested live children, used for tree responses.
///
/// The `node` fields are flattened into the JSON response, with an additional
/// `children` array sorted by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTreeNode {
    #[serde(flatten)]
    pub node: FeatureNode,
    pub children: Vec<FeatureTreeNode>,
}

impl FeatureTreeNode {
    /// Visit this node and its descendants in pre-order with their depth.
    pub fn walk<'a>(&'a self, depth: usize, visit: &mut impl FnMut(&'a FeatureTreeNode, usize)) {
        visit(self, depth);
        for child in &self.children {
            child.walk(depth + 1, visit);
        }
    }
}

/// Flatten a forest into pre-order.
pub fn flatten_forest(forest: &[FeatureTreeNode]) -> Vec<&FeatureTreeNode> {
    let mut out = Vec::new();
    for root in forest {
        root.walk(0, &mut |node, _| out.push(node));
    }
    out
}

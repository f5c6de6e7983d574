//! Concept Node - the unit of agent-authored knowledge
//!
//! Each node carries its content fields, an optional 384-dim embedding,
//! soft-delete state, and the merge metadata the two-way merge engine
//! stamps on conflicted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONCEPT KINDS
// ============================================================================

/// Semantic category of a concept (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptKind {
    /// A user-facing feature
    Feature,
    /// A code module or subsystem
    Module,
    /// A recurring implementation pattern
    Pattern,
    /// Configuration knowledge
    Config,
    /// An architectural or product decision
    Decision,
    /// A deployable or structural component
    Component,
}

impl ConceptKind {
    /// Canonical lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptKind::Feature => "feature",
            ConceptKind::Module => "module",
            ConceptKind::Pattern => "pattern",
            ConceptKind::Config => "config",
            ConceptKind::Decision => "decision",
            ConceptKind::Component => "component",
        }
    }

    /// Parse a stored string. `None` means the store is corrupt; callers
    /// surface that as an invariant violation rather than defaulting.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "feature" => Some(ConceptKind::Feature),
            "module" => Some(ConceptKind::Module),
            "pattern" => Some(ConceptKind::Pattern),
            "config" => Some(ConceptKind::Config),
            "decision" => Some(ConceptKind::Decision),
            "component" => Some(ConceptKind::Component),
            _ => None,
        }
    }

    /// All kinds, for breakdown reports.
    pub fn all() -> &'static [ConceptKind] {
        &[
            ConceptKind::Feature,
            ConceptKind::Module,
            ConceptKind::Pattern,
            ConceptKind::Config,
            ConceptKind::Decision,
            ConceptKind::Component,
        ]
    }
}

impl std::fmt::Display for ConceptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONCEPT NODE
// ============================================================================

/// A concept in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptNode {
    /// Lowercase slug, optionally nested as `parent/child`
    pub id: String,
    /// Human display name
    pub name: String,
    /// Semantic category
    pub kind: ConceptKind,
    /// Non-empty free text describing the concept
    pub summary: String,
    /// Optional rationale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    /// File path references, each possibly with a line range
    #[serde(default)]
    pub file_refs: Vec<String>,
    /// Owning parent concept (forest; at most one parent, no cycles)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Free-text tag of the task that created this concept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_task: Option<String>,
    /// When the node was created
    pub created_at: DateTime<Utc>,
    /// When the node was last modified
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp; `None` for live nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
    /// Why the node was removed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_reason: Option<String>,
    /// Unit-normalized 384-dim vector; `None` if generation failed
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    // ========== Merge metadata ==========
    /// UUID linking the competing variants of one conflicted concept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_group: Option<String>,
    /// Whether this node awaits conflict resolution
    #[serde(default)]
    pub needs_merge: bool,
    /// Branch label the variant came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
    /// When the merge flagged this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_timestamp: Option<DateTime<Utc>>,
}

impl ConceptNode {
    /// A node is live while it has not been soft-deleted.
    pub fn is_live(&self) -> bool {
        self.removed_at.is_none()
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Payload for inserting a new node. Timestamps and merge metadata are
/// assigned by the store; use `insert_node_raw` to carry them verbatim.
#[derive(Debug, Clone)]
pub struct NewConcept {
    pub id: String,
    pub name: String,
    pub kind: ConceptKind,
    pub summary: String,
    pub why: Option<String>,
    pub file_refs: Vec<String>,
    pub parent_id: Option<String>,
    pub created_by_task: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// Partial update for `update_node`. Only supplied fields are applied.
#[derive(Debug, Clone, Default)]
pub struct ConceptPatch {
    pub name: Option<String>,
    pub kind: Option<ConceptKind>,
    pub summary: Option<String>,
    pub why: Option<String>,
    pub file_refs: Option<Vec<String>>,
    pub parent_id: Option<Option<String>>,
    pub created_by_task: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

impl ConceptPatch {
    /// Whether the patch touches a field that feeds the embedding text.
    pub fn touches_embedded_text(&self) -> bool {
        self.name.is_some() || self.kind.is_some() || self.summary.is_some()
    }

    /// Whether the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.kind.is_none()
            && self.summary.is_none()
            && self.why.is_none()
            && self.file_refs.is_none()
            && self.parent_id.is_none()
            && self.created_by_task.is_none()
            && self.embedding.is_none()
    }
}

// ============================================================================
// TESTS
// ============================================================================

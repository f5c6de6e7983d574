//! Graph Model
//!
//! Typed concept nodes, relationship edges, and timeline records.

mod edge;
mod node;

pub use edge::{EdgeRecord, EdgeWithNeighbor, NewEdge, Relation};
pub use node::{ConceptKind, ConceptNode, ConceptPatch, NewConcept};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// TIMELINE
// ============================================================================

/// One row of the append-only activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// Monotonic sequence number (authoritative ordering)
    pub seq: i64,
    /// When the tool ran (UTC, second resolution)
    pub timestamp: DateTime<Utc>,
    /// Tool name (`create_concept`, `understand`, ...)
    pub tool: String,
    /// Opaque JSON string of the tool's parameters
    pub params: String,
    /// One-line human summary of the outcome
    pub result_summary: String,
    /// Whether the tool mutated the store
    pub is_write: bool,
    /// Whether the tool returned an error
    pub is_error: bool,
    /// Node ids the tool created, updated, removed, or linked
    pub affected_ids: Vec<String>,
}

/// Payload for appending a timeline row (`seq` and `timestamp` are assigned
/// by the store).
#[derive(Debug, Clone)]
pub struct NewTimelineEntry {
    pub tool: String,
    pub params: String,
    pub result_summary: String,
    pub is_write: bool,
    pub is_error: bool,
    pub affected_ids: Vec<String>,
}

/// Cheap summary of the timeline extent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBounds {
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub count: i64,
}

/// Predicates for scanning the timeline.
#[derive(Debug, Clone, Default)]
pub struct TimelineFilter {
    /// Only rows with `is_write = true`
    pub writes_only: bool,
    /// Only rows for this tool
    pub tool: Option<String>,
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub until: Option<DateTime<Utc>>,
    /// Row limit
    pub limit: Option<i64>,
}

// ============================================================================
// STATS
// ============================================================================

/// Store-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    /// Live nodes
    pub nodes: i64,
    /// Edges between live nodes
    pub edges: i64,
    /// Soft-deleted nodes
    pub removed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_entry_serializes_camel_case() {
        let entry = TimelineEntry {
            seq: 7,
            timestamp: Utc::now(),
            tool: "create_concept".to_string(),
            params: "{}".to_string(),
            result_summary: "created auth".to_string(),
            is_write: true,
            is_error: false,
            affected_ids: vec!["auth".to_string()],
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["isWrite"], true);
        assert_eq!(json["affectedIds"][0], "auth");
    }
}

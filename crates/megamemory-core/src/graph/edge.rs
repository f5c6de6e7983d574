//! Typed directed relationships between concepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// RELATIONS
// ============================================================================

/// Semantic category of an edge (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    ConnectsTo,
    DependsOn,
    Implements,
    Calls,
    ConfiguredBy,
}

impl Relation {
    /// Canonical lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::ConnectsTo => "connects_to",
            Relation::DependsOn => "depends_on",
            Relation::Implements => "implements",
            Relation::Calls => "calls",
            Relation::ConfiguredBy => "configured_by",
        }
    }

    /// Parse a stored string. `None` indicates store corruption.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connects_to" => Some(Relation::ConnectsTo),
            "depends_on" => Some(Relation::DependsOn),
            "implements" => Some(Relation::Implements),
            "calls" => Some(Relation::Calls),
            "configured_by" => Some(Relation::ConfiguredBy),
            _ => None,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EDGE RECORDS
// ============================================================================

/// A stored edge row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    /// Monotonic integer id
    pub id: i64,
    pub from_id: String,
    pub to_id: String,
    pub relation: Relation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,

    // ========== Merge metadata ==========
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_group: Option<String>,
    #[serde(default)]
    pub needs_merge: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_timestamp: Option<DateTime<Utc>>,
}

impl EdgeRecord {
    /// Content key used by the merge engine to deduplicate edge sets.
    pub fn content_key(&self) -> (String, String, Relation, Option<String>) {
        (
            self.from_id.clone(),
            self.to_id.clone(),
            self.relation,
            self.description.clone(),
        )
    }
}

/// Payload for inserting a new edge.
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub from_id: String,
    pub to_id: String,
    pub relation: Relation,
    pub description: Option<String>,
}

/// An edge joined with the neighbor's display name, as returned by
/// `get_outgoing_edges` / `get_incoming_edges`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeWithNeighbor {
    pub id: i64,
    pub from_id: String,
    pub to_id: String,
    pub relation: Relation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Display name of the node on the other endpoint
    pub neighbor_name: String,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_roundtrip() {
        for relation in [
            Relation::ConnectsTo,
            Relation::DependsOn,
            Relation::Implements,
            Relation::Calls,
            Relation::ConfiguredBy,
        ] {
            assert_eq!(Relation::parse(relation.as_str()), Some(relation));
        }
    }

    #[test]
    fn relation_rejects_unknown() {
        assert_eq!(Relation::parse("points_at"), None);
    }

    #[test]
    fn relation_serde_uses_snake_case() {
        let json = serde_json::to_string(&Relation::DependsOn).unwrap();
        assert_eq!(json, "\"depends_on\"");
        let parsed: Relation = serde_json::from_str("\"configured_by\"").unwrap();
        assert_eq!(parsed, Relation::ConfiguredBy);
    }
}

//! Conflict Resolution Strategies
//!
//! `keep left` / `keep right` hard-delete the loser and rename the winner
//! back to the canonical id; `keep both` renames each variant to
//! `<canonical>-<branch_label>`. Renames go through the store's atomic
//! `rename_node_id`, so edges pointing at the suffixed ids survive.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::ConceptNode;
use crate::store::GraphStore;

use super::{canonical_id, merge_suffix};

/// Which variant(s) survive a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeepSide {
    Left,
    Right,
    Both,
}

impl KeepSide {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(KeepSide::Left),
            "right" => Some(KeepSide::Right),
            "both" => Some(KeepSide::Both),
            _ => None,
        }
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Canonical (unsuffixed) id of the conflicted concept
    pub canonical_id: String,
    /// Node ids that exist after the resolution
    pub kept: Vec<String>,
}

/// Resolve one merge group with a keep strategy. Fails `NotFound` when the
/// group has no nodes, and `Duplicate` when a `keep both` rename target
/// already exists.
pub fn resolve_group(store: &GraphStore, merge_group: &str, keep: KeepSide) -> Result<Resolution> {
    let variants = store.get_nodes_by_merge_group(merge_group)?;
    if variants.is_empty() {
        return Err(GraphError::NotFound(merge_group.to_string()));
    }

    let canonical = canonical_id(&variants[0].id).to_string();

    match keep {
        KeepSide::Left | KeepSide::Right => {
            let wanted = if keep == KeepSide::Left { "left" } else { "right" };
            let winner = variants
                .iter()
                .find(|n| merge_suffix(&n.id) == Some(wanted))
                .ok_or_else(|| {
                    GraphError::NotFound(format!("{}::{}", canonical, wanted))
                })?
                .clone();

            for loser in variants.iter().filter(|n| n.id != winner.id) {
                store.hard_delete_node(&loser.id)?;
            }

            store.rename_node_id(&winner.id, &canonical)?;
            store.clear_node_merge_flags(&canonical)?;
            store.clear_edge_merge_flags_by_group(merge_group)?;

            Ok(Resolution {
                canonical_id: canonical.clone(),
                kept: vec![canonical],
            })
        }
        KeepSide::Both => {
            let mut kept = Vec::with_capacity(variants.len());
            let renames: Vec<(ConceptNode, String)> = variants
                .iter()
                .map(|variant| {
                    let label = variant
                        .source_branch
                        .clone()
                        .or_else(|| merge_suffix(&variant.id).map(str::to_string))
                        .unwrap_or_else(|| "variant".to_string());
                    (variant.clone(), format!("{}-{}", canonical, label))
                })
                .collect();

            for (_, new_id) in &renames {
                if store.get_node_including_removed(new_id)?.is_some() {
                    return Err(GraphError::Duplicate(new_id.clone()));
                }
            }

            for (variant, new_id) in renames {
                store.rename_node_id(&variant.id, &new_id)?;
                store.clear_node_merge_flags(&new_id)?;
                kept.push(new_id);
            }
            store.clear_edge_merge_flags_by_group(merge_group)?;

            Ok(Resolution {
                canonical_id: canonical,
                kept,
            })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConceptKind, NewConcept, NewEdge, Relation};
    use crate::merge::{merge_files, MergeLabels};
    use tempfile::TempDir;

    fn concept(id: &str, summary: &str) -> NewConcept {
        NewConcept {
            id: id.to_string(),
            name: id.to_string(),
            kind: ConceptKind::Feature,
            summary: summary.to_string(),
            why: None,
            file_refs: vec![],
            parent_id: None,
            created_by_task: None,
            embedding: None,
        }
    }

    /// Merge two stores that disagree on `feature-x` and have a clean
    /// `caller` with an edge into the conflicted target.
    fn conflicted_store(dir: &TempDir) -> (GraphStore, String) {
        {
            let left = GraphStore::open(Some(dir.path().join("left.db"))).unwrap();
            let right = GraphStore::open(Some(dir.path().join("right.db"))).unwrap();
            left.insert_node(&concept("feature-x", "L")).unwrap();
            right.insert_node(&concept("feature-x", "R")).unwrap();
            left.insert_node(&concept("caller", "same")).unwrap();
            right.insert_node(&concept("caller", "same")).unwrap();
            left.insert_edge(&NewEdge {
                from_id: "caller".to_string(),
                to_id: "feature-x".to_string(),
                relation: Relation::Calls,
                description: None,
            })
            .unwrap();
        }
        let report = merge_files(
            &dir.path().join("left.db"),
            &dir.path().join("right.db"),
            &dir.path().join("out.db"),
            &MergeLabels::default(),
        )
        .unwrap();
        let store = GraphStore::open(Some(dir.path().join("out.db"))).unwrap();
        (store, report.merge_groups[0].clone())
    }

    #[test]
    fn unknown_group_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(Some(dir.path().join("x.db"))).unwrap();
        let err = resolve_group(&store, "no-such-group", KeepSide::Left).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn keep_left_restores_canonical_id() {
        let dir = TempDir::new().unwrap();
        let (store, group) = conflicted_store(&dir);

        let resolution = resolve_group(&store, &group, KeepSide::Left).unwrap();
        assert_eq!(resolution.canonical_id, "feature-x");
        assert_eq!(resolution.kept, vec!["feature-x".to_string()]);

        let winner = store.get_node("feature-x").unwrap().unwrap();
        assert_eq!(winner.summary, "L");
        assert!(!winner.needs_merge);
        assert!(winner.merge_group.is_none());

        assert!(store
            .get_node_including_removed("feature-x::left")
            .unwrap()
            .is_none());
        assert!(store
            .get_node_including_removed("feature-x::right")
            .unwrap()
            .is_none());

        // The clean caller's edge followed the rename
        let edges = store.get_outgoing_edges("caller").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to_id, "feature-x");

        assert!(store.get_conflict_nodes().unwrap().is_empty());
    }

    #[test]
    fn keep_right_keeps_the_other_summary() {
        let dir = TempDir::new().unwrap();
        let (store, group) = conflicted_store(&dir);

        resolve_group(&store, &group, KeepSide::Right).unwrap();
        let winner = store.get_node("feature-x").unwrap().unwrap();
        assert_eq!(winner.summary, "R");
    }

    #[test]
    fn keep_both_renames_by_branch_label() {
        let dir = TempDir::new().unwrap();
        let (store, group) = conflicted_store(&dir);

        let resolution = resolve_group(&store, &group, KeepSide::Both).unwrap();
        let mut kept = resolution.kept.clone();
        kept.sort();
        assert_eq!(kept, vec!["feature-x-left", "feature-x-right"]);

        assert!(store.get_node("feature-x-left").unwrap().is_some());
        assert!(store.get_node("feature-x-right").unwrap().is_some());
        assert!(store.get_node("feature-x").unwrap().is_none());
        assert!(store.get_conflict_nodes().unwrap().is_empty());

        // Caller's edge survived the rename (it pointed at ::left)
        let edges = store.get_outgoing_edges("caller").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to_id, "feature-x-left");
    }

    #[test]
    fn keep_both_refuses_colliding_target() {
        let dir = TempDir::new().unwrap();
        let (store, group) = conflicted_store(&dir);
        store.insert_node(&concept("feature-x-left", "squatter")).unwrap();

        let err = resolve_group(&store, &group, KeepSide::Both).unwrap_err();
        assert_eq!(err.kind(), "Duplicate");
    }

    #[test]
    fn keep_side_parsing() {
        assert_eq!(KeepSide::parse("left"), Some(KeepSide::Left));
        assert_eq!(KeepSide::parse("right"), Some(KeepSide::Right));
        assert_eq!(KeepSide::parse("both"), Some(KeepSide::Both));
        assert_eq!(KeepSide::parse("ours"), None);
    }
}

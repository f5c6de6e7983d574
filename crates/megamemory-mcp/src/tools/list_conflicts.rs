//! list_conflicts tool — pending merge conflicts, grouped.
//!
//! Every node with `needs_merge` set, grouped by merge group. Each group
//! carries the competing versions in full, including removed-vs-live
//! conflicts where one variant is soft-deleted.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use megamemory_core::{canonical_id, ConceptNode, GraphStore};

use super::{record, ToolResult};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

fn version_json(node: &ConceptNode) -> Value {
    json!({
        "id": node.id,
        "canonicalId": canonical_id(&node.id),
        "sourceBranch": node.source_branch,
        "name": node.name,
        "kind": node.kind,
        "summary": node.summary,
        "why": node.why,
        "fileRefs": node.file_refs,
        "parentId": node.parent_id,
        "removedAt": node.removed_at,
        "removedReason": node.removed_reason,
    })
}

pub async fn execute(store: &Arc<GraphStore>, args: Option<Value>) -> ToolResult {
    let params = args.unwrap_or_else(|| json!({}));

    let mut by_group: BTreeMap<String, Vec<ConceptNode>> = BTreeMap::new();
    for node in store.get_conflict_nodes()? {
        let group = node.merge_group.clone().unwrap_or_else(|| {
            // Invariant 7 says this cannot happen; key the stray node by its
            // own id so it at least shows up.
            format!("(unlabeled:{})", node.id)
        });
        by_group.entry(group).or_default().push(node);
    }

    let groups: Vec<Value> = by_group
        .iter()
        .map(|(group, versions)| {
            let merge_timestamp = versions.iter().find_map(|v| v.merge_timestamp);
            json!({
                "mergeGroup": group,
                "mergeTimestamp": merge_timestamp,
                "canonicalId": versions
                    .first()
                    .map(|v| canonical_id(&v.id).to_string()),
                "versions": versions.iter().map(version_json).collect::<Vec<_>>(),
            })
        })
        .collect();

    record(
        store,
        "list_conflicts",
        &params,
        &format!("{} conflict group(s)", groups.len()),
        false,
        false,
        vec![],
    );

    Ok(json!({ "count": groups.len(), "groups": groups }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::test_env;
    use megamemory_core::{merge_files, ConceptKind, GraphStore, MergeLabels, NewConcept};
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

    /// Build a store holding one live-vs-live conflict and one
    /// removed-vs-live conflict.
    fn conflicted_store(dir: &TempDir) -> Arc<GraphStore> {
        {
            let left = GraphStore::open(Some(dir.path().join("left.db"))).unwrap();
            let right = GraphStore::open(Some(dir.path().join("right.db"))).unwrap();
            left.insert_node(&concept("feature-x", "L")).unwrap();
            right.insert_node(&concept("feature-x", "R")).unwrap();
            left.insert_node(&concept("doomed", "kept")).unwrap();
            right.insert_node(&concept("doomed", "kept")).unwrap();
            right.soft_delete_node("doomed", "obsolete").unwrap();
        }
        merge_files(
            &dir.path().join("left.db"),
            &dir.path().join("right.db"),
            &dir.path().join("out.db"),
            &MergeLabels::default(),
        )
        .unwrap();
        Arc::new(GraphStore::open(Some(dir.path().join("out.db"))).unwrap())
    }

    #[tokio::test]
    async fn empty_store_has_no_groups() {
        let (store, _embedder, _dir) = test_env();
        let result = execute(&store, None).await.unwrap();
        assert_eq!(result["count"], 0);
    }

    #[tokio::test]
    async fn groups_carry_both_versions() {
        let dir = TempDir::new().unwrap();
        let store = conflicted_store(&dir);

        let result = execute(&store, None).await.unwrap();
        assert_eq!(result["count"], 2);

        let groups = result["groups"].as_array().unwrap();
        for group in groups {
            assert!(group["mergeGroup"].as_str().is_some());
            assert!(group["mergeTimestamp"].as_str().is_some());
            let versions = group["versions"].as_array().unwrap();
            assert_eq!(versions.len(), 2);

            let branches: Vec<&str> = versions
                .iter()
                .map(|v| v["sourceBranch"].as_str().unwrap())
                .collect();
            assert!(branches.contains(&"left") && branches.contains(&"right"));
        }
    }

    #[tokio::test]
    async fn removed_vs_live_conflict_is_included() {
        let dir = TempDir::new().unwrap();
        let store = conflicted_store(&dir);

        let result = execute(&store, None).await.unwrap();
        let groups = result["groups"].as_array().unwrap();
        let doomed = groups
            .iter()
            .find(|g| g["canonicalId"] == "doomed")
            .unwrap();

        let versions = doomed["versions"].as_array().unwrap();
        let removed_states: Vec<bool> = versions
            .iter()
            .map(|v| !v["removedAt"].is_null())
            .collect();
        assert!(removed_states.contains(&true));
        assert!(removed_states.contains(&false));
    }
}

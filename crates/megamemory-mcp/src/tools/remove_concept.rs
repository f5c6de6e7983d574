//! remove_concept tool — soft-delete a concept.
//!
//! The node keeps its row (with `removed_at` / `removed_reason`), its edges
//! are hard-deleted, and live children become roots.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use megamemory_core::GraphStore;

use super::{parse_args, record, ToolResult};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Id of the concept to remove"
            },
            "reason": {
                "type": "string",
                "description": "Why the concept is being removed"
            }
        },
        "required": ["id", "reason"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RemoveArgs {
    id: String,
    reason: String,
}

pub async fn execute(store: &Arc<GraphStore>, args: Option<Value>) -> ToolResult {
    let params = args.clone().unwrap_or_else(|| json!({}));
    let args: RemoveArgs = parse_args(args)?;

    store.soft_delete_node(&args.id, &args.reason)?;

    record(
        store,
        "remove_concept",
        &params,
        &format!("removed {}", args.id),
        true,
        false,
        vec![args.id.clone()],
    );

    Ok(json!({
        "id": args.id,
        "message": format!("Removed '{}': {}", args.id, args.reason),
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{kind_of, test_env};
    use megamemory_core::{ConceptKind, NewConcept, NewEdge, Relation};

    fn seed(store: &GraphStore, id: &str) {
        store
            .insert_node(&NewConcept {
                id: id.to_string(),
                name: id.to_string(),
                kind: ConceptKind::Module,
                summary: "s".to_string(),
                why: None,
                file_refs: vec![],
                parent_id: None,
                created_by_task: None,
                embedding: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn soft_delete_cascades_edges_but_not_children() {
        let (store, _embedder, _dir) = test_env();
        seed(&store, "a");
        seed(&store, "b");
        store
            .insert_edge(&NewEdge {
                from_id: "a".to_string(),
                to_id: "b".to_string(),
                relation: Relation::Calls,
                description: None,
            })
            .unwrap();

        execute(&store, Some(json!({ "id": "a", "reason": "retired" })))
            .await
            .unwrap();

        assert!(store.get_node("a").unwrap().is_none());
        assert!(store.get_node("b").unwrap().is_some());
        assert!(store.get_incoming_edges("b").unwrap().is_empty());

        let removed = store.get_node_including_removed("a").unwrap().unwrap();
        assert_eq!(removed.removed_reason.as_deref(), Some("retired"));
    }

    #[tokio::test]
    async fn missing_node_is_not_found() {
        let (store, _embedder, _dir) = test_env();
        let result = execute(&store, Some(json!({ "id": "ghost", "reason": "x" }))).await;
        assert_eq!(kind_of(&result), "NotFound");
    }

    #[tokio::test]
    async fn double_remove_is_already_removed() {
        let (store, _embedder, _dir) = test_env();
        seed(&store, "a");
        execute(&store, Some(json!({ "id": "a", "reason": "first" })))
            .await
            .unwrap();

        let result = execute(&store, Some(json!({ "id": "a", "reason": "second" }))).await;
        assert_eq!(kind_of(&result), "AlreadyRemoved");
    }
}

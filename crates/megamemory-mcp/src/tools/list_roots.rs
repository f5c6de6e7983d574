//! list_roots tool — top-level view of the graph.
//!
//! Returns every live root concept with one level of children, plus overall
//! stats. An empty graph gets a bootstrap hint instead of a bare list.

use std::sync::Arc;

use serde_json::{json, Value};

use megamemory_core::GraphStore;

use super::{record, ToolResult};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute(store: &Arc<GraphStore>, args: Option<Value>) -> ToolResult {
    let params = args.unwrap_or_else(|| json!({}));

    let stats = store.get_stats()?;
    let kinds = store.get_kinds_breakdown()?;

    let mut roots = Vec::new();
    for root in store.get_root_nodes()? {
        let children: Vec<Value> = store
            .get_children(&root.id)?
            .iter()
            .map(|child| {
                json!({
                    "id": child.id,
                    "name": child.name,
                    "kind": child.kind,
                    "summary": child.summary,
                })
            })
            .collect();

        roots.push(json!({
            "id": root.id,
            "name": root.name,
            "kind": root.kind,
            "summary": root.summary,
            "children": children,
        }));
    }

    let mut response = json!({
        "roots": roots,
        "stats": {
            "nodes": stats.nodes,
            "edges": stats.edges,
            "removed": stats.removed,
            "kinds": kinds,
        },
    });

    if stats.nodes == 0 {
        response["hint"] = json!(
            "The graph is empty. Bootstrap it by creating concepts for the \
             project's main features, modules, and decisions with create_concept."
        );
    }

    record(
        store,
        "list_roots",
        &params,
        &format!("{} roots", roots_len(&response)),
        false,
        false,
        vec![],
    );

    Ok(response)
}

fn roots_len(response: &Value) -> usize {
    response["roots"].as_array().map(Vec::len).unwrap_or(0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::test_env;
    use megamemory_core::{ConceptKind, NewConcept};

    fn seed(store: &GraphStore, id: &str, parent: Option<&str>) {
        store
            .insert_node(&NewConcept {
                id: id.to_string(),
                name: id.to_string(),
                kind: ConceptKind::Module,
                summary: format!("summary of {}", id),
                why: None,
                file_refs: vec![],
                parent_id: parent.map(str::to_string),
                created_by_task: None,
                embedding: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn empty_graph_carries_hint() {
        let (store, _embedder, _dir) = test_env();
        let result = execute(&store, None).await.unwrap();
        assert_eq!(result["roots"].as_array().unwrap().len(), 0);
        assert!(result["hint"].as_str().unwrap().contains("create_concept"));
        assert_eq!(result["stats"]["nodes"], 0);
    }

    #[tokio::test]
    async fn roots_with_one_level_of_children() {
        let (store, _embedder, _dir) = test_env();
        seed(&store, "platform", None);
        seed(&store, "platform/auth", Some("platform"));
        seed(&store, "platform/auth/jwt", Some("platform/auth"));
        seed(&store, "tooling", None);

        let result = execute(&store, None).await.unwrap();
        let roots = result["roots"].as_array().unwrap();
        assert_eq!(roots.len(), 2);

        let platform = roots.iter().find(|r| r["id"] == "platform").unwrap();
        let children = platform["children"].as_array().unwrap();
        // one level only: the grandchild is absent
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["id"], "platform/auth");

        assert!(result.get("hint").is_none());
        assert_eq!(result["stats"]["nodes"], 4);
        assert_eq!(result["stats"]["kinds"]["module"], 4);
    }
}

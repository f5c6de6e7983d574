//! link tool — create or delete a typed relationship.
//!
//! Both endpoints must be live. Duplicate `(from, to, relation)` links are
//! allowed; `action: "unlink"` deletes every matching edge instead.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use megamemory_core::{GraphStore, NewEdge, Relation};

use super::{parse_args, record, ToolResult};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "from": {
                "type": "string",
                "description": "Source concept id"
            },
            "to": {
                "type": "string",
                "description": "Target concept id"
            },
            "relation": {
                "type": "string",
                "enum": ["connects_to", "depends_on", "implements", "calls", "configured_by"]
            },
            "description": {
                "type": "string",
                "description": "Optional note on the relationship"
            },
            "action": {
                "type": "string",
                "enum": ["link", "unlink"],
                "default": "link",
                "description": "'unlink' deletes every matching edge instead of creating one"
            }
        },
        "required": ["from", "to", "relation"]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LinkAction {
    #[default]
    Link,
    Unlink,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LinkArgs {
    from: String,
    to: String,
    relation: Relation,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    action: LinkAction,
}

pub async fn execute(store: &Arc<GraphStore>, args: Option<Value>) -> ToolResult {
    let params = args.clone().unwrap_or_else(|| json!({}));
    let args: LinkArgs = parse_args(args)?;

    match args.action {
        LinkAction::Link => {
            let edge_id = store.insert_edge(&NewEdge {
                from_id: args.from.clone(),
                to_id: args.to.clone(),
                relation: args.relation,
                description: args.description.clone(),
            })?;

            record(
                store,
                "link",
                &params,
                &format!("linked {} -{}-> {}", args.from, args.relation, args.to),
                true,
                false,
                vec![args.from.clone(), args.to.clone()],
            );

            Ok(json!({
                "edgeId": edge_id,
                "message": format!("Linked '{}' -{}-> '{}'", args.from, args.relation, args.to),
            }))
        }
        LinkAction::Unlink => {
            let removed = store.delete_edge(&args.from, &args.to, args.relation)?;

            record(
                store,
                "link",
                &params,
                &format!("unlinked {} -{}-> {}", args.from, args.relation, args.to),
                true,
                false,
                vec![args.from.clone(), args.to.clone()],
            );

            Ok(json!({
                "removed": removed,
                "message": format!(
                    "Removed {} edge(s) '{}' -{}-> '{}'",
                    removed, args.from, args.relation, args.to
                ),
            }))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{kind_of, test_env};
    use megamemory_core::{ConceptKind, NewConcept};

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
    async fn links_two_live_nodes() {
        let (store, _embedder, _dir) = test_env();
        seed(&store, "api");
        seed(&store, "auth");

        let result = execute(
            &store,
            Some(json!({ "from": "api", "to": "auth", "relation": "depends_on" })),
        )
        .await
        .unwrap();
        assert!(result["edgeId"].as_i64().unwrap() > 0);

        let outgoing = store.get_outgoing_edges("api").unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].relation, Relation::DependsOn);
    }

    #[tokio::test]
    async fn missing_endpoint_is_named() {
        let (store, _embedder, _dir) = test_env();
        seed(&store, "api");

        let result = execute(
            &store,
            Some(json!({ "from": "api", "to": "ghost", "relation": "calls" })),
        )
        .await;
        assert_eq!(kind_of(&result), "NotFound");
        if let Err(e) = result {
            assert!(e.to_string().contains("ghost"));
        }
    }

    #[tokio::test]
    async fn duplicate_links_are_allowed() {
        let (store, _embedder, _dir) = test_env();
        seed(&store, "a");
        seed(&store, "b");
        let args = json!({ "from": "a", "to": "b", "relation": "calls" });

        execute(&store, Some(args.clone())).await.unwrap();
        execute(&store, Some(args)).await.unwrap();

        assert_eq!(store.get_outgoing_edges("a").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unlink_removes_matching_edges() {
        let (store, _embedder, _dir) = test_env();
        seed(&store, "a");
        seed(&store, "b");
        let link_args = json!({ "from": "a", "to": "b", "relation": "calls" });
        execute(&store, Some(link_args.clone())).await.unwrap();
        execute(&store, Some(link_args)).await.unwrap();

        let result = execute(
            &store,
            Some(json!({ "from": "a", "to": "b", "relation": "calls", "action": "unlink" })),
        )
        .await
        .unwrap();

        assert_eq!(result["removed"], 2);
        assert!(store.get_outgoing_edges("a").unwrap().is_empty());
    }
}

//! create_concept tool — add a concept to the graph.
//!
//! The id is slugified from the display name (nested under the parent when
//! one is given). Declared edges whose targets exist are inserted in the
//! same call; targets that do not exist are skipped, not fatal.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use megamemory_core::{
    embedding_text, slugify, validate_id, ConceptKind, GraphError, GraphStore, NewConcept,
    NewEdge, Relation, TextEmbedder,
};

use super::{parse_args, record, ToolError, ToolResult};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {
                "type": "string",
                "description": "Human display name; the id is derived from it"
            },
            "kind": {
                "type": "string",
                "enum": ["feature", "module", "pattern", "config", "decision", "component"],
                "description": "Semantic category of the concept"
            },
            "summary": {
                "type": "string",
                "description": "What this concept is, in a sentence or two"
            },
            "why": {
                "type": "string",
                "description": "Optional rationale"
            },
            "parent_id": {
                "type": "string",
                "description": "Existing concept to nest this one under"
            },
            "file_refs": {
                "type": "array",
                "items": { "type": "string" },
                "description": "File paths (optionally with line ranges) this concept covers"
            },
            "edges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "to": { "type": "string" },
                        "relation": {
                            "type": "string",
                            "enum": ["connects_to", "depends_on", "implements", "calls", "configured_by"]
                        },
                        "description": { "type": "string" }
                    },
                    "required": ["to", "relation"]
                },
                "description": "Relationships to existing concepts; unknown targets are skipped"
            },
            "created_by_task": {
                "type": "string",
                "description": "Free-text tag of the task creating this concept"
            }
        },
        "required": ["name", "kind", "summary"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EdgeArg {
    to: String,
    relation: Relation,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateArgs {
    name: String,
    kind: ConceptKind,
    summary: String,
    #[serde(default)]
    why: Option<String>,
    #[serde(default, alias = "parent_id")]
    parent_id: Option<String>,
    #[serde(default, alias = "file_refs")]
    file_refs: Vec<String>,
    #[serde(default)]
    edges: Vec<EdgeArg>,
    #[serde(default, alias = "created_by_task")]
    created_by_task: Option<String>,
}

pub async fn execute(
    store: &Arc<GraphStore>,
    embedder: &Arc<dyn TextEmbedder>,
    args: Option<Value>,
) -> ToolResult {
    let params = args.clone().unwrap_or_else(|| json!({}));
    let args: CreateArgs = parse_args(args)?;

    if args.summary.trim().is_empty() {
        return Err(ToolError::InvalidParams(
            "summary must not be empty".to_string(),
        ));
    }

    let id = slugify(&args.name, args.parent_id.as_deref());
    validate_id(&id)?;

    let embedding = embedder
        .embed(&embedding_text(&args.name, args.kind, &args.summary))
        .map_err(GraphError::from)?;

    store.insert_node(&NewConcept {
        id: id.clone(),
        name: args.name.clone(),
        kind: args.kind,
        summary: args.summary.clone(),
        why: args.why.clone(),
        file_refs: args.file_refs.clone(),
        parent_id: args.parent_id.clone(),
        created_by_task: args.created_by_task.clone(),
        embedding: Some(embedding),
    })?;

    let mut linked = 0usize;
    let mut skipped: Vec<String> = Vec::new();
    for edge in &args.edges {
        if store.get_node(&edge.to)?.is_some() {
            store.insert_edge(&NewEdge {
                from_id: id.clone(),
                to_id: edge.to.clone(),
                relation: edge.relation,
                description: edge.description.clone(),
            })?;
            linked += 1;
        } else {
            tracing::debug!(target_id = %edge.to, "edge target missing, skipped");
            skipped.push(edge.to.clone());
        }
    }

    let message = if skipped.is_empty() {
        format!("Created '{}' with {} edge(s)", id, linked)
    } else {
        format!(
            "Created '{}' with {} edge(s); skipped missing target(s): {}",
            id,
            linked,
            skipped.join(", ")
        )
    };

    record(
        store,
        "create_concept",
        &params,
        &format!("created {}", id),
        true,
        false,
        vec![id.clone()],
    );

    Ok(json!({ "id": id, "message": message }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{kind_of, test_env};

    #[tokio::test]
    async fn creates_node_with_slug_and_embedding() {
        let (store, embedder, _dir) = test_env();
        let result = execute(
            &store,
            &embedder,
            Some(json!({
                "name": "MCP Server",
                "kind": "component",
                "summary": "Speaks the protocol"
            })),
        )
        .await
        .unwrap();

        assert_eq!(result["id"], "mcp-server");
        let node = store.get_node("mcp-server").unwrap().unwrap();
        assert_eq!(node.kind, ConceptKind::Component);
        assert!(node.embedding.is_some());
        assert_eq!(node.embedding.unwrap().len(), 384);
    }

    #[tokio::test]
    async fn nested_under_parent() {
        let (store, embedder, _dir) = test_env();
        execute(
            &store,
            &embedder,
            Some(json!({ "name": "MCP Server", "kind": "component", "summary": "s" })),
        )
        .await
        .unwrap();

        let result = execute(
            &store,
            &embedder,
            Some(json!({
                "name": "Tool Registration",
                "kind": "feature",
                "summary": "registers tools",
                "parentId": "mcp-server"
            })),
        )
        .await
        .unwrap();

        assert_eq!(result["id"], "mcp-server/tool-registration");
        let node = store
            .get_node("mcp-server/tool-registration")
            .unwrap()
            .unwrap();
        assert_eq!(node.parent_id.as_deref(), Some("mcp-server"));
    }

    #[tokio::test]
    async fn duplicate_id_fails() {
        let (store, embedder, _dir) = test_env();
        let args = json!({ "name": "Auth", "kind": "module", "summary": "s" });
        execute(&store, &embedder, Some(args.clone())).await.unwrap();
        let result = execute(&store, &embedder, Some(args)).await;
        assert_eq!(kind_of(&result), "Duplicate");
    }

    #[tokio::test]
    async fn missing_parent_fails() {
        let (store, embedder, _dir) = test_env();
        let result = execute(
            &store,
            &embedder,
            Some(json!({
                "name": "Orphan",
                "kind": "module",
                "summary": "s",
                "parentId": "no-such-parent"
            })),
        )
        .await;
        assert_eq!(kind_of(&result), "InvalidParent");
    }

    #[tokio::test]
    async fn unslugifiable_name_is_invalid_id() {
        let (store, embedder, _dir) = test_env();
        let result = execute(
            &store,
            &embedder,
            Some(json!({ "name": "!!!", "kind": "module", "summary": "s" })),
        )
        .await;
        assert_eq!(kind_of(&result), "InvalidId");
    }

    #[tokio::test]
    async fn declared_edges_link_existing_targets_and_skip_missing() {
        let (store, embedder, _dir) = test_env();
        execute(
            &store,
            &embedder,
            Some(json!({ "name": "auth", "kind": "module", "summary": "jwt" })),
        )
        .await
        .unwrap();

        let result = execute(
            &store,
            &embedder,
            Some(json!({
                "name": "api",
                "kind": "module",
                "summary": "rest",
                "edges": [
                    { "to": "auth", "relation": "depends_on" },
                    { "to": "phantom", "relation": "calls" }
                ]
            })),
        )
        .await
        .unwrap();

        assert!(result["message"].as_str().unwrap().contains("phantom"));

        let outgoing = store.get_outgoing_edges("api").unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].to_id, "auth");

        let incoming = store.get_incoming_edges("auth").unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_id, "api");
    }

    #[tokio::test]
    async fn write_is_recorded_with_affected_id() {
        let (store, embedder, _dir) = test_env();
        execute(
            &store,
            &embedder,
            Some(json!({ "name": "Auth", "kind": "module", "summary": "s" })),
        )
        .await
        .unwrap();

        let entries = store
            .get_timeline_entries(&megamemory_core::TimelineFilter {
                writes_only: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].affected_ids, vec!["auth".to_string()]);
    }

    #[tokio::test]
    async fn empty_summary_is_rejected() {
        let (store, embedder, _dir) = test_env();
        let result = execute(
            &store,
            &embedder,
            Some(json!({ "name": "Auth", "kind": "module", "summary": "   " })),
        )
        .await;
        assert_eq!(kind_of(&result), "InvalidParams");
    }
}

//! update_concept tool — patch an existing concept.
//!
//! Only supplied fields are applied. When the patch touches `name`, `kind`,
//! or `summary`, the embedding is regenerated from the post-patch values.
//! A patch that changes nothing returns an idempotent message without
//! bumping `updated_at`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use megamemory_core::{
    embedding_text, ConceptKind, ConceptPatch, GraphError, GraphStore, TextEmbedder,
};

use super::{parse_args, record, ToolResult};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Id of the concept to update"
            },
            "changes": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "kind": {
                        "type": "string",
                        "enum": ["feature", "module", "pattern", "config", "decision", "component"]
                    },
                    "summary": { "type": "string" },
                    "why": { "type": "string" },
                    "file_refs": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "parent_id": { "type": "string" },
                    "created_by_task": { "type": "string" }
                }
            }
        },
        "required": ["id", "changes"]
    })
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Changes {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    kind: Option<ConceptKind>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    why: Option<String>,
    #[serde(default, alias = "file_refs")]
    file_refs: Option<Vec<String>>,
    #[serde(default, alias = "parent_id")]
    parent_id: Option<String>,
    #[serde(default, alias = "created_by_task")]
    created_by_task: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateArgs {
    id: String,
    changes: Changes,
}

pub async fn execute(
    store: &Arc<GraphStore>,
    embedder: &Arc<dyn TextEmbedder>,
    args: Option<Value>,
) -> ToolResult {
    let params = args.clone().unwrap_or_else(|| json!({}));
    let args: UpdateArgs = parse_args(args)?;

    let current = store
        .get_node(&args.id)?
        .ok_or_else(|| GraphError::NotFound(args.id.clone()))?;

    let mut patch = ConceptPatch {
        name: args.changes.name,
        kind: args.changes.kind,
        summary: args.changes.summary,
        why: args.changes.why,
        file_refs: args.changes.file_refs,
        parent_id: args.changes.parent_id.map(Some),
        created_by_task: args.changes.created_by_task,
        embedding: None,
    };

    if patch.touches_embedded_text() {
        let name = patch.name.as_deref().unwrap_or(&current.name);
        let kind = patch.kind.unwrap_or(current.kind);
        let summary = patch.summary.as_deref().unwrap_or(&current.summary);
        let embedding = embedder
            .embed(&embedding_text(name, kind, summary))
            .map_err(GraphError::from)?;
        patch.embedding = Some(embedding);
    }

    let changed = store.update_node(&args.id, &patch)?;

    let message = if changed {
        format!("Updated '{}'", args.id)
    } else {
        format!("'{}' already up to date, nothing changed", args.id)
    };

    record(
        store,
        "update_concept",
        &params,
        if changed {
            format!("updated {}", args.id)
        } else {
            format!("no-op update of {}", args.id)
        }
        .as_str(),
        true,
        false,
        vec![args.id.clone()],
    );

    Ok(json!({ "id": args.id, "changed": changed, "message": message }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{kind_of, test_env};
    use crate::tools::create_concept;

    async fn seed(store: &Arc<GraphStore>, embedder: &Arc<dyn TextEmbedder>) {
        create_concept::execute(
            store,
            embedder,
            Some(json!({ "name": "Auth", "kind": "module", "summary": "old summary" })),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn patch_applies_and_regenerates_embedding() {
        let (store, embedder, _dir) = test_env();
        seed(&store, &embedder).await;

        let before = store.get_node("auth").unwrap().unwrap();

        let result = execute(
            &store,
            &embedder,
            Some(json!({
                "id": "auth",
                "changes": { "summary": "completely different text about sessions" }
            })),
        )
        .await
        .unwrap();
        assert_eq!(result["changed"], true);

        let after = store.get_node("auth").unwrap().unwrap();
        assert_eq!(after.summary, "completely different text about sessions");
        assert_ne!(before.embedding, after.embedding);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn why_only_patch_keeps_embedding() {
        let (store, embedder, _dir) = test_env();
        seed(&store, &embedder).await;
        let before = store.get_node("auth").unwrap().unwrap();

        execute(
            &store,
            &embedder,
            Some(json!({ "id": "auth", "changes": { "why": "compliance" } })),
        )
        .await
        .unwrap();

        let after = store.get_node("auth").unwrap().unwrap();
        assert_eq!(after.why.as_deref(), Some("compliance"));
        assert_eq!(before.embedding, after.embedding);
    }

    #[tokio::test]
    async fn identical_patch_is_idempotent() {
        let (store, embedder, _dir) = test_env();
        seed(&store, &embedder).await;

        let result = execute(
            &store,
            &embedder,
            Some(json!({ "id": "auth", "changes": { "summary": "old summary" } })),
        )
        .await
        .unwrap();

        assert_eq!(result["changed"], false);
        assert!(result["message"]
            .as_str()
            .unwrap()
            .contains("nothing changed"));
    }

    #[tokio::test]
    async fn missing_node_is_not_found() {
        let (store, embedder, _dir) = test_env();
        let result = execute(
            &store,
            &embedder,
            Some(json!({ "id": "ghost", "changes": { "summary": "x" } })),
        )
        .await;
        assert_eq!(kind_of(&result), "NotFound");
    }

    #[tokio::test]
    async fn removed_node_is_not_found() {
        let (store, embedder, _dir) = test_env();
        seed(&store, &embedder).await;
        store.soft_delete_node("auth", "retired").unwrap();

        let result = execute(
            &store,
            &embedder,
            Some(json!({ "id": "auth", "changes": { "summary": "x" } })),
        )
        .await;
        assert_eq!(kind_of(&result), "NotFound");
    }
}

//! resolve_conflict tool — AI-assisted resolution of one merge group.
//!
//! Winner selection: a live variant beats a soft-deleted one (the conflict
//! was "one side deleted"); otherwise the `::left` variant wins. The loser
//! is hard-deleted, the winner is renamed back to the canonical id, the
//! resolved content patch is applied (regenerating the embedding), and the
//! merge flags are cleared on the winner and on every edge in the group.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use megamemory_core::{
    canonical_id, embedding_text, merge_suffix, ConceptPatch, GraphError, GraphStore,
    TextEmbedder,
};

use super::{parse_args, record, ToolResult};

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "merge_group": {
                "type": "string",
                "description": "UUID of the conflict group to resolve"
            },
            "resolved": {
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "why": { "type": "string" },
                    "file_refs": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["summary"],
                "description": "The reconciled content for the surviving concept"
            },
            "reason": {
                "type": "string",
                "description": "Why this resolution was chosen (recorded in the timeline)"
            }
        },
        "required": ["merge_group", "resolved", "reason"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ResolvedContent {
    summary: String,
    #[serde(default)]
    why: Option<String>,
    #[serde(default, alias = "file_refs")]
    file_refs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ResolveArgs {
    #[serde(alias = "merge_group")]
    merge_group: String,
    resolved: ResolvedContent,
    reason: String,
}

pub async fn execute(
    store: &Arc<GraphStore>,
    embedder: &Arc<dyn TextEmbedder>,
    args: Option<Value>,
) -> ToolResult {
    let params = args.clone().unwrap_or_else(|| json!({}));
    let args: ResolveArgs = parse_args(args)?;

    let variants = store.get_nodes_by_merge_group(&args.merge_group)?;
    if variants.is_empty() {
        return Err(GraphError::NotFound(args.merge_group.clone()).into());
    }

    let canonical = canonical_id(&variants[0].id).to_string();

    // Live beats removed; among equals, ::left wins.
    let winner = variants
        .iter()
        .filter(|v| v.is_live())
        .min_by_key(|v| merge_suffix(&v.id) != Some("left"))
        .or_else(|| {
            variants
                .iter()
                .min_by_key(|v| merge_suffix(&v.id) != Some("left"))
        })
        .cloned()
        .ok_or_else(|| GraphError::NotFound(args.merge_group.clone()))?;

    for loser in variants.iter().filter(|v| v.id != winner.id) {
        store.hard_delete_node(&loser.id)?;
    }

    store.rename_node_id(&winner.id, &canonical)?;

    // Apply the reconciled content; skip when the surviving variant is
    // itself removed (both sides had deleted it).
    if winner.is_live() {
        let embedding = embedder
            .embed(&embedding_text(
                &winner.name,
                winner.kind,
                &args.resolved.summary,
            ))
            .map_err(GraphError::from)?;

        store.update_node(
            &canonical,
            &ConceptPatch {
                summary: Some(args.resolved.summary.clone()),
                why: args.resolved.why.clone(),
                file_refs: args.resolved.file_refs.clone(),
                embedding: Some(embedding),
                ..Default::default()
            },
        )?;
    }

    store.clear_node_merge_flags(&canonical)?;
    store.clear_edge_merge_flags_by_group(&args.merge_group)?;

    record(
        store,
        "resolve_conflict",
        &params,
        &format!("resolved {} as {}: {}", args.merge_group, canonical, args.reason),
        true,
        false,
        vec![canonical.clone()],
    );

    Ok(json!({
        "id": canonical,
        "message": format!("Resolved conflict group {} into '{}'", args.merge_group, canonical),
    }))
}

// ============================================================================
// TESTS
// ============================================================================

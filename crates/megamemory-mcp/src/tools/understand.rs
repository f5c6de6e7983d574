//! understand tool — semantic query over the graph.
//!
//! Embeds the agent's natural-language intent, scans every live concept
//! embedding by cosine similarity, and returns the top matches as context
//! envelopes: the node plus its children, parent, and both-directional
//! edges, annotated with the similarity score.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use megamemory_core::{find_top_k, ConceptNode, EdgeWithNeighbor, GraphStore, TextEmbedder};

use super::{parse_args, record, ToolResult};

const DEFAULT_TOP_K: usize = 10;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Natural-language description of what you are about to work on"
            },
            "top_k": {
                "type": "integer",
                "description": "Maximum number of matches to return (default: 10)",
                "default": 10,
                "minimum": 1,
                "maximum": 50
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UnderstandArgs {
    query: String,
    #[serde(default, alias = "top_k")]
    top_k: Option<usize>,
}

fn edge_json(edge: &EdgeWithNeighbor) -> Value {
    json!({
        "from": edge.from_id,
        "to": edge.to_id,
        "relation": edge.relation,
        "description": edge.description,
        "neighborName": edge.neighbor_name,
    })
}

fn envelope(
    store: &GraphStore,
    node: &ConceptNode,
    similarity: f32,
) -> Result<Value, megamemory_core::GraphError> {
    let children: Vec<Value> = store
        .get_children(&node.id)?
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

    let outgoing: Vec<Value> = store
        .get_outgoing_edges(&node.id)?
        .iter()
        .map(edge_json)
        .collect();
    let incoming: Vec<Value> = store
        .get_incoming_edges(&node.id)?
        .iter()
        .map(edge_json)
        .collect();

    let parent = match &node.parent_id {
        Some(parent_id) => store
            .get_node(parent_id)?
            .map(|parent| json!({ "id": parent.id, "name": parent.name })),
        None => None,
    };

    Ok(json!({
        "id": node.id,
        "name": node.name,
        "kind": node.kind,
        "summary": node.summary,
        "why": node.why,
        "fileRefs": node.file_refs,
        "parentId": node.parent_id,
        "createdByTask": node.created_by_task,
        "createdAt": node.created_at,
        "updatedAt": node.updated_at,
        "similarity": similarity,
        "children": children,
        "outgoingEdges": outgoing,
        "incomingEdges": incoming,
        "parent": parent,
    }))
}

pub async fn execute(
    store: &Arc<GraphStore>,
    embedder: &Arc<dyn TextEmbedder>,
    args: Option<Value>,
) -> ToolResult {
    let params = args.clone().unwrap_or_else(|| json!({}));
    let args: UnderstandArgs = parse_args(args)?;
    let top_k = args.top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, 50);

    if args.query.trim().is_empty() {
        record(store, "understand", &params, "empty query", false, false, vec![]);
        return Ok(json!({ "matches": [] }));
    }

    let candidates = store.get_all_active_nodes_with_embeddings()?;
    if candidates.is_empty() {
        record(
            store,
            "understand",
            &params,
            "no concepts with embeddings",
            false,
            false,
            vec![],
        );
        return Ok(json!({ "matches": [] }));
    }

    let query_vector = embedder
        .embed(&args.query)
        .map_err(megamemory_core::GraphError::from)?;

    let scored: Vec<(String, Option<Vec<f32>>)> = candidates
        .iter()
        .map(|node| (node.id.clone(), node.embedding.clone()))
        .collect();
    let top = find_top_k(&query_vector, &scored, top_k)
        .map_err(megamemory_core::GraphError::from)?;

    let mut matches = Vec::with_capacity(top.len());
    for (id, similarity) in &top {
        if let Some(node) = candidates.iter().find(|n| &n.id == id) {
            matches.push(envelope(store, node, *similarity)?);
        }
    }

    record(
        store,
        "understand",
        &params,
        &format!("{} matches for '{}'", matches.len(), args.query),
        false,
        false,
        vec![],
    );

    Ok(json!({ "matches": matches }))
}

// ============================================================================
// TESTS
// ============================================================================

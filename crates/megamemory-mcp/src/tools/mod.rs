//! MCP Tools
//!
//! The operations the agent invokes on the knowledge graph. Every call is
//! recorded in the store's timeline with `{tool, params, result_summary,
//! is_write, is_error, affected_ids}`; a timeline-logging failure never
//! fails the tool, it is swallowed and reported on stderr.

pub mod create_concept;
pub mod link;
pub mod list_conflicts;
pub mod list_roots;
pub mod remove_concept;
pub mod resolve_conflict;
pub mod understand;
pub mod update_concept;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use megamemory_core::{GraphError, GraphStore, NewTimelineEntry, TextEmbedder};

// ============================================================================
// ERRORS
// ============================================================================

/// Tool-layer failure.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The arguments object did not match the tool's schema
    #[error("{0}")]
    InvalidParams(String),
    /// No tool with this name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    /// Engine error, surfaced verbatim as `{error_kind, message}`
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type ToolResult = Result<Value, ToolError>;

/// Deserialize a tool's arguments, treating `None` as `{}`.
fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T, ToolError> {
    let value = args.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(value)
        .map_err(|e| ToolError::InvalidParams(format!("Invalid arguments: {}", e)))
}

// ============================================================================
// TIMELINE RECORDING
// ============================================================================

/// Append the tool's timeline row, swallowing any logging failure.
pub(crate) fn record(
    store: &GraphStore,
    tool: &str,
    params: &Value,
    result_summary: &str,
    is_write: bool,
    is_error: bool,
    affected_ids: Vec<String>,
) {
    let entry = NewTimelineEntry {
        tool: tool.to_string(),
        params: params.to_string(),
        result_summary: result_summary.to_string(),
        is_write,
        is_error,
        affected_ids,
    };
    if let Err(e) = store.insert_timeline_entry(&entry) {
        tracing::warn!("Timeline logging failed for {}: {}", tool, e);
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Whether a tool mutates the store.
pub fn is_write_tool(name: &str) -> bool {
    matches!(
        name,
        "create_concept" | "update_concept" | "link" | "remove_concept" | "resolve_conflict"
    )
}

/// Route a tool call by name. Engine errors are also recorded in the
/// timeline (with `is_error = true`) before being returned.
pub async fn dispatch(
    store: &Arc<GraphStore>,
    embedder: &Arc<dyn TextEmbedder>,
    name: &str,
    args: Option<Value>,
) -> ToolResult {
    let params = args.clone().unwrap_or_else(|| Value::Object(Default::default()));

    let result = match name {
        "understand" => understand::execute(store, embedder, args).await,
        "create_concept" => create_concept::execute(store, embedder, args).await,
        "update_concept" => update_concept::execute(store, embedder, args).await,
        "link" => link::execute(store, args).await,
        "remove_concept" => remove_concept::execute(store, args).await,
        "list_roots" => list_roots::execute(store, args).await,
        "list_conflicts" => list_conflicts::execute(store, args).await,
        "resolve_conflict" => resolve_conflict::execute(store, embedder, args).await,
        other => return Err(ToolError::UnknownTool(other.to_string())),
    };

    if let Err(ToolError::Graph(e)) = &result {
        record(
            store,
            name,
            &params,
            &e.to_string(),
            is_write_tool(name),
            true,
            vec![],
        );
    }

    result
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use megamemory_core::EmbeddingError;
    use tempfile::TempDir;

    /// Deterministic bag-of-bytes embedder: similar texts get similar
    /// vectors, identical texts get identical ones. No model download.
    pub struct MockEmbedder;

    impl TextEmbedder for MockEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.trim().is_empty() {
                return Err(EmbeddingError::EmptyInput);
            }
            let mut vector = vec![0.0_f32; 384];
            for byte in text.to_lowercase().bytes() {
                vector[byte as usize % 384] += 1.0;
            }
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            for x in &mut vector {
                *x /= norm;
            }
            Ok(vector)
        }
    }

    pub fn test_env() -> (Arc<GraphStore>, Arc<dyn TextEmbedder>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(Some(dir.path().join("test.db"))).unwrap();
        (Arc::new(store), Arc::new(MockEmbedder), dir)
    }

    /// Shorthand for asserting the stable error kind of a tool failure.
    pub fn kind_of(result: &ToolResult) -> &'static str {
        match result {
            Err(ToolError::Graph(e)) => e.kind(),
            Err(ToolError::InvalidParams(_)) => "InvalidParams",
            Err(ToolError::UnknownTool(_)) => "UnknownTool",
            Ok(_) => "Ok",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::test_env;

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let (store, embedder, _dir) = test_env();
        let result = dispatch(&store, &embedder, "summon_demon", None).await;
        assert!(matches!(result, Err(ToolError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn engine_errors_are_recorded_with_is_error() {
        let (store, embedder, _dir) = test_env();
        let args = serde_json::json!({ "id": "ghost", "reason": "x" });
        let result = dispatch(&store, &embedder, "remove_concept", Some(args)).await;
        assert!(result.is_err());

        let entries = store
            .get_timeline_entries(&megamemory_core::TimelineFilter::default())
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_error);
        assert!(entries[0].is_write);
        assert_eq!(entries[0].tool, "remove_concept");
    }
}

//! MCP Server Core
//!
//! Routes JSON-RPC requests to the tool layer. Engine errors come back as
//! tool results carrying the stable `{error_kind, message}` object rather
//! than transport errors, so agents can react to them.

use std::sync::Arc;

use tracing::{debug, info, warn};

use megamemory_core::{GraphStore, TextEmbedder};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools::{self, ToolError};

/// MCP server state.
pub struct McpServer {
    store: Arc<GraphStore>,
    embedder: Arc<dyn TextEmbedder>,
    initialized: bool,
}

impl McpServer {
    pub fn new(store: Arc<GraphStore>, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            store,
            embedder,
            initialized: false,
        }
    }

    /// Handle one request; `None` for notifications.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("Rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older than ours; clients
        // reject servers that answer with a newer protocol.
        let negotiated = if request.protocol_version.as_str() < MCP_VERSION {
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        match &request.client_info {
            Some(client) => info!(
                "MCP session initialized for {} {} (protocol {})",
                client.name,
                client.version.as_deref().unwrap_or(""),
                negotiated
            ),
            None => info!("MCP session initialized (protocol {})", negotiated),
        }

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "megamemory".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(serde_json::json!({ "listChanged": false })),
            },
            instructions: Some(
                "MegaMemory is the project's knowledge graph: persistent memory shared \
                 across sessions. Call 'understand' with your intent before starting work, \
                 record new features, modules, patterns, and decisions with \
                 'create_concept', and wire them together with 'link'. After a branch \
                 merge, check 'list_conflicts' and settle each group with \
                 'resolve_conflict'."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "understand".to_string(),
                description: Some(
                    "Semantic query over the knowledge graph. Describe what you are about to \
                     work on; returns the most relevant concepts with their children, parent, \
                     and relationships, ranked by similarity."
                        .to_string(),
                ),
                input_schema: tools::understand::schema(),
            },
            ToolDescription {
                name: "create_concept".to_string(),
                description: Some(
                    "Record a concept (feature, module, pattern, config, decision, or \
                     component). Optionally nest it under a parent and declare edges to \
                     existing concepts."
                        .to_string(),
                ),
                input_schema: tools::create_concept::schema(),
            },
            ToolDescription {
                name: "update_concept".to_string(),
                description: Some(
                    "Patch an existing concept. Only supplied fields change; touching name, \
                     kind, or summary re-indexes the concept."
                        .to_string(),
                ),
                input_schema: tools::update_concept::schema(),
            },
            ToolDescription {
                name: "link".to_string(),
                description: Some(
                    "Create (or with action='unlink', delete) a typed relationship between \
                     two concepts."
                        .to_string(),
                ),
                input_schema: tools::link::schema(),
            },
            ToolDescription {
                name: "remove_concept".to_string(),
                description: Some(
                    "Soft-delete a concept. Its relationships are dropped and its children \
                     become roots; the record stays for history."
                        .to_string(),
                ),
                input_schema: tools::remove_concept::schema(),
            },
            ToolDescription {
                name: "list_roots".to_string(),
                description: Some(
                    "Top-level map of the graph: every root concept with one level of \
                     children, plus overall stats."
                        .to_string(),
                ),
                input_schema: tools::list_roots::schema(),
            },
            ToolDescription {
                name: "list_conflicts".to_string(),
                description: Some(
                    "Pending merge conflicts, grouped. Each group shows the competing \
                     versions from both branches."
                        .to_string(),
                ),
                input_schema: tools::list_conflicts::schema(),
            },
            ToolDescription {
                name: "resolve_conflict".to_string(),
                description: Some(
                    "Resolve one merge-conflict group with reconciled content. A live \
                     variant wins over a deleted one; otherwise the left variant wins."
                        .to_string(),
                ),
                input_schema: tools::resolve_conflict::schema(),
            },
        ];

        serde_json::to_value(ListToolsResult { tools })
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing tool call params")),
        };

        let result = tools::dispatch(
            &self.store,
            &self.embedder,
            &request.name,
            request.arguments,
        )
        .await;

        let call_result = match result {
            Ok(value) => CallToolResult::success(&value),
            Err(ToolError::UnknownTool(name)) => {
                return Err(JsonRpcError::method_not_found(&format!(
                    "Unknown tool: {}",
                    name
                )));
            }
            Err(ToolError::InvalidParams(message)) => {
                return Err(JsonRpcError::invalid_params(&message));
            }
            Err(ToolError::Graph(e)) => {
                warn!("Tool '{}' failed: {}", request.name, e);
                CallToolResult::failure(e.kind(), &e.to_string())
            }
        };

        serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

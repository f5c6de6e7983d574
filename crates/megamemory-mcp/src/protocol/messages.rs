//! MCP Message Shapes
//!
//! Typed payloads for the MCP methods this server implements:
//! `initialize`, `tools/list`, and `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// INITIALIZE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

fn default_protocol_version() -> String {
    super::types::MCP_VERSION.to_string()
}

impl Default for InitializeRequest {
    fn default() -> Self {
        Self {
            protocol_version: default_protocol_version(),
            client_info: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    pub capabilities: ServerCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
}

// ============================================================================
// TOOLS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescription {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ToolResultContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Wrap a tool's JSON result in the text-content envelope.
    pub fn success(value: &Value) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            }],
            is_error: Some(false),
        }
    }

    /// Wrap a stable `{error_kind, message}` error object.
    pub fn failure(error_kind: &str, message: &str) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text: serde_json::json!({
                    "error_kind": error_kind,
                    "message": message,
                })
                .to_string(),
            }],
            is_error: Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_request_defaults() {
        let request: InitializeRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.protocol_version, super::super::types::MCP_VERSION);
    }

    #[test]
    fn call_tool_result_failure_carries_error_kind() {
        let result = CallToolResult::failure("NotFound", "Not found: auth");
        assert_eq!(result.is_error, Some(true));
        let parsed: Value = serde_json::from_str(&result.content[0].text).unwrap();
        assert_eq!(parsed["error_kind"], "NotFound");
        assert_eq!(parsed["message"], "Not found: auth");
    }

    #[test]
    fn tool_description_uses_input_schema_key() {
        let desc = ToolDescription {
            name: "understand".to_string(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_value(&desc).unwrap();
        assert!(json.get("inputSchema").is_some());
    }
}

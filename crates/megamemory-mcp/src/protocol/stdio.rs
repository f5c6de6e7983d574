//! stdio Transport
//!
//! Line-delimited JSON-RPC over stdin/stdout. Logging goes to stderr; stdout
//! carries nothing but responses.

use std::io::{self, BufRead, BufReader, Write};
use tracing::{debug, error, warn};

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::McpServer;

/// Last-resort response when even error serialization fails, so the client
/// never hangs waiting on a request.
const FALLBACK_RESPONSE: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// stdio transport loop.
#[derive(Default)]
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }

    fn send(stdout: &mut impl Write, response: &JsonRpcResponse) -> io::Result<()> {
        match serde_json::to_string(response) {
            Ok(json) => {
                debug!("Sending {} bytes", json.len());
                writeln!(stdout, "{}", json)?;
            }
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                writeln!(stdout, "{}", FALLBACK_RESPONSE)?;
            }
        }
        stdout.flush()
    }

    /// Run the server until stdin closes.
    pub async fn run(self, mut server: McpServer) -> io::Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let reader = BufReader::new(stdin.lock());
        let mut stdout = stdout.lock();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            debug!("Received {} bytes", line.len());

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Unparseable request: {}", e);
                    Self::send(
                        &mut stdout,
                        &JsonRpcResponse::error(None, JsonRpcError::parse_error()),
                    )?;
                    continue;
                }
            };

            if let Some(response) = server.handle_request(request).await {
                Self::send(&mut stdout, &response)?;
            }
        }

        Ok(())
    }
}

//! MegaMemory MCP Server
//!
//! Knowledge graph server for coding agents over the Model Context Protocol.
//! One SQLite file per project (`.megamemory/knowledge.db`, overridable via
//! `MEGAMEMORY_DB_PATH`), local 384-dim embeddings, eight tools.

mod protocol;
mod server;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use megamemory_core::{CachingEmbedder, GraphStore, TextEmbedder};

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

/// Parse command-line arguments, returning the optional store path.
/// Exits for `--help` / `--version`.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("MegaMemory MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Per-project knowledge graph server over the Model Context Protocol.");
                println!();
                println!("USAGE:");
                println!("    megamemory-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help          Print help information");
                println!("    -V, --version       Print version information");
                println!("    --db <PATH>         Store file (default: .megamemory/knowledge.db)");
                println!();
                println!("ENVIRONMENT:");
                println!("    MEGAMEMORY_DB_PATH      Store file override");
                println!("    MEGAMEMORY_MODEL_CACHE  Embedding model cache directory");
                println!("    RUST_LOG                Log level filter (debug, info, warn, error)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("megamemory-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--db" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --db requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--db=") => {
                let path = arg.strip_prefix("--db=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --db requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'megamemory-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    db_path
}

fn build_embedder() -> Arc<dyn TextEmbedder> {
    #[cfg(feature = "embeddings")]
    {
        Arc::new(CachingEmbedder::new(megamemory_core::LocalEmbedder::new()))
    }
    #[cfg(not(feature = "embeddings"))]
    {
        Arc::new(CachingEmbedder::new(
            megamemory_core::UnavailableEmbedder,
        ))
    }
}

#[tokio::main]
async fn main() {
    let db_path = parse_args();

    // Logging to stderr; stdout is reserved for JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!(
        "MegaMemory MCP Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let store = match GraphStore::open(db_path) {
        Ok(store) => {
            info!("Store opened at {}", store.path().display());
            Arc::new(store)
        }
        Err(e) => {
            error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let embedder = build_embedder();

    // Warm the model off the handshake path; first use would otherwise
    // stall the initial understand call behind a download.
    #[cfg(feature = "embeddings")]
    {
        tokio::task::spawn_blocking(|| {
            let local = megamemory_core::LocalEmbedder::new();
            if let Err(e) = local.init() {
                error!("Embedding model unavailable: {}", e);
                error!("Semantic queries will fail until the model can be loaded");
            } else {
                info!("Embedding model ready ({})", local.model_name());
            }
        });
    }

    let server = McpServer::new(store, embedder);
    let transport = StdioTransport::new();

    info!("Serving MCP on stdio");
    if let Err(e) = transport.run(server).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("MegaMemory MCP Server shutting down");
}

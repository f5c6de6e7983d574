//! # MegaMemory Core
//!
//! Knowledge graph engine for coding agents: persistent cross-session memory
//! stored in a single SQLite file per project.
//!
//! - **Graph store**: typed concept nodes and relationship edges with soft
//!   deletion, schema migrations, and an append-only activity timeline
//! - **Semantic index**: local 384-dim sentence embeddings
//!   (all-MiniLM-L6-v2) with exhaustive cosine-similarity retrieval
//! - **Merge engine**: two-way reconciliation of divergent graph files with
//!   first-class conflict groups and keep-left/right/both resolution
//! - **Time travel**: reconstruct the graph as of any past timestamp
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use megamemory_core::{ConceptKind, GraphStore, NewConcept};
//!
//! let store = GraphStore::open(None)?; // .megamemory/knowledge.db
//!
//! store.insert_node(&NewConcept {
//!     id: "auth".to_string(),
//!     name: "Auth".to_string(),
//!     kind: ConceptKind::Module,
//!     summary: "Handles JWT validation".to_string(),
//!     why: None,
//!     file_refs: vec![],
//!     parent_id: None,
//!     created_by_task: None,
//!     embedding: None,
//! })?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local embedding generation with fastembed
//! - `bundled-sqlite` (default): compile SQLite into the binary

// ============================================================================
// MODULES
// ============================================================================

pub mod embeddings;
pub mod error;
pub mod graph;
pub mod merge;
pub mod slug;
pub mod store;
pub mod timeline;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use error::{GraphError, Result};

pub use graph::{
    ConceptKind, ConceptNode, ConceptPatch, EdgeRecord, EdgeWithNeighbor, GraphStats, NewConcept,
    NewEdge, NewTimelineEntry, Relation, TimelineBounds, TimelineEntry, TimelineFilter,
};

pub use store::{GraphStore, DB_PATH_ENV, DEFAULT_DB_DIR, DEFAULT_DB_FILE};

pub use slug::{slugify, validate_id, MERGE_SUFFIXES};

pub use embeddings::{
    cache::CachingEmbedder, cosine_similarity, embedding_from_bytes, embedding_text,
    embedding_to_bytes, find_top_k, EmbeddingError, TextEmbedder, UnavailableEmbedder,
    EMBEDDING_DIMENSIONS,
};

#[cfg(feature = "embeddings")]
pub use embeddings::local::LocalEmbedder;

pub use merge::{
    canonical_id, merge_files, merge_suffix, resolve_group, KeepSide, MergeLabels, MergeReport,
    Resolution,
};

pub use timeline::timeline_with_synthesis;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Embedding model backing the semantic index
pub const EMBEDDING_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";

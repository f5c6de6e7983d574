//! Embedding Provider
//!
//! Dense 384-dim sentence embeddings for concept nodes, plus the cosine
//! similarity scan used by semantic queries. The model itself is a black box
//! behind the [`TextEmbedder`] trait; [`local::LocalEmbedder`] backs it with
//! fastembed when the `embeddings` feature is on.

pub mod cache;
#[cfg(feature = "embeddings")]
pub mod local;

use crate::error::GraphError;
use crate::graph::ConceptKind;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Width of every stored embedding vector.
pub const EMBEDDING_DIMENSIONS: usize = 384;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("Embedding generation failed: {0}")]
    GenerationFailed(String),
    /// Empty or whitespace-only input
    #[error("Text cannot be empty")]
    EmptyInput,
    /// Mismatched vector lengths during similarity
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<EmbeddingError> for GraphError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::EmptyInput => GraphError::EmbeddingInput,
            EmbeddingError::DimensionMismatch { expected, actual } => {
                GraphError::EmbeddingDim { expected, actual }
            }
            EmbeddingError::ModelInit(detail) => GraphError::EmbeddingUnavailable(detail),
            EmbeddingError::GenerationFailed(detail) => GraphError::EmbeddingUnavailable(detail),
        }
    }
}

// ============================================================================
// EMBEDDER SEAM
// ============================================================================

/// Text-to-vector extractor. One process-wide instance is shared by every
/// tool invocation; implementations must be safe to call concurrently.
pub trait TextEmbedder: Send + Sync {
    /// Embed a single text into a unit-length vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector width produced by this embedder.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

/// Placeholder embedder for builds without the `embeddings` feature; every
/// call reports the provider as unavailable.
pub struct UnavailableEmbedder;

impl TextEmbedder for UnavailableEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::ModelInit(
            "built without the embeddings feature".to_string(),
        ))
    }
}

/// Compose the string embedded for a concept.
///
/// The `"{kind}: {name} — {summary}"` format is part of the contract:
/// changing it invalidates every stored embedding.
pub fn embedding_text(name: &str, kind: ConceptKind, summary: &str) -> String {
    format!("{}: {} — {}", kind.as_str(), name, summary)
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Cosine similarity `dot(a,b) / (||a||·||b||)`.
///
/// Returns 0.0 when either norm is zero; mismatched lengths are an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        Ok(dot / denominator)
    } else {
        Ok(0.0)
    }
}

/// Exhaustive top-k scan over candidate vectors.
///
/// Candidates with a missing or empty embedding are skipped. Results are
/// `(id, similarity)` pairs sorted by descending similarity.
pub fn find_top_k(
    query: &[f32],
    candidates: &[(String, Option<Vec<f32>>)],
    k: usize,
) -> Result<Vec<(String, f32)>, EmbeddingError> {
    let mut scored: Vec<(String, f32)> = Vec::new();
    for (id, embedding) in candidates {
        let Some(vector) = embedding else { continue };
        if vector.is_empty() {
            continue;
        }
        scored.push((id.clone(), cosine_similarity(query, vector)?));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    Ok(scored)
}

// ============================================================================
// BYTE CODEC
// ============================================================================

/// Serialize a vector as raw little-endian f32 bytes (384 floats = 1536
/// bytes). Little-endian is the on-disk contract; on a big-endian target the
/// per-float conversion below does the swap.
pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize raw little-endian f32 bytes. Returns `None` when the buffer
/// length is not a multiple of four.
pub fn embedding_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

// ============================================================================
// TESTS
// ============================================================================

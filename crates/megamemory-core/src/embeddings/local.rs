//! Local Embedding Model
//!
//! fastembed-backed [`TextEmbedder`] using all-MiniLM-L6-v2 (384 dimensions,
//! mean-pooled and L2-normalized). The model is loaded lazily on first use
//! and shared process-wide; the initial call may download model files into
//! the cache directory, after which no network access happens.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

use super::{EmbeddingError, TextEmbedder, EMBEDDING_DIMENSIONS};

/// Maximum text length passed to the model (longer inputs are truncated).
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Global model handle; the first caller completes initialization while
/// others wait on the `OnceLock`.
static EMBEDDING_MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Cache directory for model files. `MEGAMEMORY_MODEL_CACHE` overrides the
/// platform cache dir.
fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("MEGAMEMORY_MODEL_CACHE") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "megamemory", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/megamemory/fastembed");
    }

    std::path::PathBuf::from(".megamemory-model-cache")
}

fn model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL.get_or_init(|| {
        let cache = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache) {
            tracing::warn!("Failed to create model cache directory {:?}: {}", cache, e);
        }

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false)
            .with_cache_dir(cache);

        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| {
                format!(
                    "Failed to initialize all-MiniLM-L6-v2: {}. \
                     Ensure the ONNX runtime is available and model files can be downloaded.",
                    e
                )
            })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

// ============================================================================
// LOCAL EMBEDDER
// ============================================================================

/// fastembed-backed embedder for concept text.
#[derive(Default)]
pub struct LocalEmbedder {
    _unused: (),
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self { _unused: () }
    }

    /// Eagerly load the model, surfacing any initialization error.
    pub fn init(&self) -> Result<(), EmbeddingError> {
        model().map(|_| ())
    }

    /// Whether the model is loaded and usable.
    pub fn is_ready(&self) -> bool {
        model().is_ok()
    }

    pub fn model_name(&self) -> &'static str {
        "sentence-transformers/all-MiniLM-L6-v2"
    }
}

impl TextEmbedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut model = model()?;

        let text = if text.len() > MAX_TEXT_LENGTH {
            let mut end = MAX_TEXT_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        } else {
            text
        };

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;

        let mut vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationFailed("No embedding generated".into()))?;

        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(EmbeddingError::GenerationFailed(format!(
                "Model produced {} dimensions, expected {}",
                vector.len(),
                EMBEDDING_DIMENSIONS
            )));
        }

        // Mean pooling happens in the model; normalize to unit length here.
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected_before_model_load() {
        let embedder = LocalEmbedder::new();
        assert!(matches!(
            embedder.embed(""),
            Err(EmbeddingError::EmptyInput)
        ));
        assert!(matches!(
            embedder.embed("   \n\t "),
            Err(EmbeddingError::EmptyInput)
        ));
    }

    #[test]
    fn cache_dir_honors_env_override() {
        // Serialize with a unique var value; std::env is process-global.
        std::env::set_var("MEGAMEMORY_MODEL_CACHE", "/tmp/mm-model-cache-test");
        assert_eq!(
            cache_dir(),
            std::path::PathBuf::from("/tmp/mm-model-cache-test")
        );
        std::env::remove_var("MEGAMEMORY_MODEL_CACHE");
    }
}

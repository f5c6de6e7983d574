//! Query Embedding Cache
//!
//! Agents tend to re-issue the same natural-language queries within a
//! session; an LRU in front of the model avoids re-embedding them.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use super::{EmbeddingError, TextEmbedder};

/// Default number of cached query embeddings.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// LRU-caching wrapper around any [`TextEmbedder`].
pub struct CachingEmbedder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<E: TextEmbedder> CachingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<E: TextEmbedder> TextEmbedder for CachingEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(vector) = cache.get(text) {
                return Ok(vector.clone());
            }
        }

        let vector = self.inner.embed(text)?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(text.to_string(), vector.clone());
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder(AtomicUsize);

    impl TextEmbedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.trim().is_empty() {
                return Err(EmbeddingError::EmptyInput);
            }
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[test]
    fn repeated_queries_hit_the_cache() {
        let embedder = CachingEmbedder::new(CountingEmbedder(AtomicUsize::new(0)));
        embedder.embed("same query").unwrap();
        embedder.embed("same query").unwrap();
        embedder.embed("other query").unwrap();
        assert_eq!(embedder.inner.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let embedder = CachingEmbedder::new(CountingEmbedder(AtomicUsize::new(0)));
        assert!(embedder.embed("  ").is_err());
        assert!(embedder.embed("  ").is_err());
        assert_eq!(embedder.inner.0.load(Ordering::SeqCst), 0);
    }
}

pub mod preprocess;
pub mod provider;

use crate::cache::{CacheStatsSnapshot, EmbeddingCache};
use crate::document::Document;
use crate::error::CoreError;
use provider::EmbeddingProvider;

/// Preprocesses, caches, batch-coalesces, and delegates to a provider.
pub struct EmbeddingService {
    provider: Box<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl EmbeddingService {
    pub fn new(provider: Box<dyn EmbeddingProvider>, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    pub fn with_defaults(provider: Box<dyn EmbeddingProvider>) -> Self {
        Self::new(provider, EmbeddingCache::with_defaults())
    }

    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let key = preprocess::cache_key(text);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let processed = preprocess::preprocess(text);
        let embedding = self.provider.embed_text(&processed).await.map_err(|e| {
            CoreError::Embedding(format!("failed to generate embedding: {e}"))
        })?;

        self.cache.set(&key, embedding.clone());
        Ok(embedding)
    }

    /// Preserves input order. Probes the cache for each text; collects the
    /// uncached ones; issues exactly one provider batch call for them (if
    /// any); stores the results back into the cache and their result slots.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut uncached: Vec<(usize, String)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = preprocess::cache_key(text);
            if let Some(cached) = self.cache.get(&key) {
                results[i] = Some(cached);
            } else {
                uncached.push((i, text.clone()));
            }
        }

        if !uncached.is_empty() {
            let processed: Vec<String> = uncached.iter().map(|(_, t)| preprocess::preprocess(t)).collect();
            let embeddings = self.provider.embed_batch(&processed).await.map_err(|e| {
                CoreError::Embedding(format!("failed to generate batch embeddings: {e}"))
            })?;

            if embeddings.len() != uncached.len() {
                return Err(CoreError::Embedding(
                    "failed to generate batch embeddings: provider returned mismatched count".to_string(),
                ));
            }

            for ((original_index, original_text), embedding) in uncached.into_iter().zip(embeddings) {
                let key = preprocess::cache_key(&original_text);
                self.cache.set(&key, embedding.clone());
                results[original_index] = Some(embedding);
            }
        }

        Ok(results.into_iter().map(|r| r.expect("every slot is filled by cache or batch result")).collect())
    }

    pub async fn embed_document(&self, doc: &mut Document) -> Result<(), CoreError> {
        let augmented = preprocess::augmented_content(doc);
        let embedding = self.embed_text(&augmented).await?;
        doc.embedding = Some(embedding);
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }
}

#[cfg(test)]
mod tests {
    use super::provider::test_support::StubProvider;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn scenario_batch_mixed_cache() {
        // spec §8 scenario 2.
        let provider = StubProvider::new("stub", 4);
        let batch_calls = provider.batch_calls.clone();
        let service = EmbeddingService::with_defaults(Box::new(provider));

        let cached_a = service.embed_text("a").await.unwrap();
        let cached_c = service.embed_text("c").await.unwrap();

        let results = service
            .embed_batch(&["a".into(), "b".into(), "c".into(), "d".into()])
            .await
            .unwrap();

        assert_eq!(batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(results[0], cached_a);
        assert_eq!(results[2], cached_c);
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_without_calling_provider() {
        let provider = StubProvider::new("stub", 4);
        let batch_calls = provider.batch_calls.clone();
        let service = EmbeddingService::with_defaults(Box::new(provider));

        let results = service.embed_batch(&[]).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(batch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embed_text_hits_cache_on_repeat() {
        let provider = StubProvider::new("stub", 4);
        let calls = provider.calls.clone();
        let service = EmbeddingService::with_defaults(Box::new(provider));

        let first = service.embed_text("foo").await.unwrap();
        let second = service.embed_text("foo").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! In-memory `DocumentStore`: the test-harness backend, and the simplest of
//! the three backends spec §4.4 permits.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::document::{now_secs, Collection, Document, SearchFilter, default_collections};
use crate::error::CoreError;
use crate::vector::cosine;

use super::rrf::{self, RrfConfig};
use super::{CollectionStats, DocumentStore, StoreStats};

enum State {
    Uninitialized,
    Ready,
}

struct Inner {
    state: State,
    documents: HashMap<String, Document>,
    collections: HashMap<String, Collection>,
}

pub struct InMemoryDocumentStore {
    inner: RwLock<Inner>,
    rrf_config: RrfConfig,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: State::Uninitialized,
                documents: HashMap::new(),
                collections: HashMap::new(),
            }),
            rrf_config: RrfConfig::default(),
        }
    }

    pub fn with_rrf_config(rrf_config: RrfConfig) -> Self {
        Self { rrf_config, ..Self::new() }
    }

    fn require_ready(&self) -> Result<(), CoreError> {
        let inner = self.inner.read().expect("store lock poisoned");
        match inner.state {
            State::Ready => Ok(()),
            State::Uninitialized => Err(CoreError::Storage("store not initialized".to_string())),
        }
    }

    fn text_score(query: &str, content: &str) -> usize {
        let query_lower = query.to_ascii_lowercase();
        let content_lower = content.to_ascii_lowercase();
        query_lower
            .split_whitespace()
            .map(|term| content_lower.matches(term).count())
            .sum()
    }

    fn sort_by_score_then_tiebreak(docs: &mut [Document]) {
        docs.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn initialize(&self) -> super::BoxFut<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("store lock poisoned");
            for collection in default_collections() {
                inner.collections.entry(collection.name.clone()).or_insert(collection);
            }
            inner.state = State::Ready;
            Ok(())
        })
    }

    fn index(&self, doc: Document) -> super::BoxFut<'_, ()> {
        Box::pin(async move {
            self.require_ready()?;
            let mut inner = self.inner.write().expect("store lock poisoned");
            let collection_name = doc.doc_type.collection();
            let is_new = !inner.documents.contains_key(&doc.id);
            inner.documents.insert(doc.id.clone(), doc);
            if is_new {
                if let Some(collection) = inner.collections.get_mut(collection_name) {
                    collection.document_count += 1;
                    collection.updated_at = now_secs();
                }
            }
            Ok(())
        })
    }

    fn batch_index(&self, docs: Vec<Document>) -> super::BoxFut<'_, ()> {
        Box::pin(async move {
            self.require_ready()?;
            for doc in docs {
                let id = doc.id.clone();
                if let Err(e) = self.index(doc).await {
                    tracing::warn!(id = %id, error = %e, "batch_index: skipping row");
                }
            }
            Ok(())
        })
    }

    fn search_similar<'a>(
        &'a self,
        embedding: &'a [f32],
        k: usize,
        filter: &'a SearchFilter,
    ) -> super::BoxFut<'a, Vec<Document>> {
        Box::pin(async move {
            self.require_ready()?;
            if k == 0 {
                return Ok(Vec::new());
            }
            let inner = self.inner.read().expect("store lock poisoned");
            let mut scored: Vec<Document> = inner
                .documents
                .values()
                .filter(|d| filter.matches(d))
                .filter_map(|d| {
                    d.embedding.as_ref().map(|e| {
                        let mut doc = d.clone();
                        doc.score = Some(cosine(e, embedding));
                        doc
                    })
                })
                .collect();
            Self::sort_by_score_then_tiebreak(&mut scored);
            scored.truncate(k);
            Ok(scored)
        })
    }

    fn search_by_text<'a>(
        &'a self,
        query: &'a str,
        k: usize,
        filter: &'a SearchFilter,
    ) -> super::BoxFut<'a, Vec<Document>> {
        Box::pin(async move {
            self.require_ready()?;
            if k == 0 {
                return Ok(Vec::new());
            }
            let inner = self.inner.read().expect("store lock poisoned");
            let mut scored: Vec<Document> = inner
                .documents
                .values()
                .filter(|d| filter.matches(d))
                .filter_map(|d| {
                    let score = Self::text_score(query, &d.content);
                    if score == 0 {
                        None
                    } else {
                        let mut doc = d.clone();
                        doc.score = Some(score as f32);
                        Some(doc)
                    }
                })
                .collect();
            Self::sort_by_score_then_tiebreak(&mut scored);
            scored.truncate(k);
            Ok(scored)
        })
    }

    fn hybrid_search<'a>(&'a self, query: &'a str, embedding: &'a [f32], k: usize) -> super::BoxFut<'a, Vec<Document>> {
        Box::pin(async move {
            let candidate_count = 3 * k.max(1);
            let unfiltered = SearchFilter::default();

            let vector_results = self.search_similar(embedding, candidate_count, &unfiltered).await?;

            let text_results = match self.search_by_text(query, candidate_count, &unfiltered).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(error = %e, "text search failed during hybrid search, degrading to vector-only");
                    Vec::new()
                }
            };

            Ok(rrf::fuse(vector_results, text_results, k, self.rrf_config))
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> super::BoxFut<'a, Option<Document>> {
        Box::pin(async move {
            self.require_ready()?;
            let mut inner = self.inner.write().expect("store lock poisoned");
            if let Some(doc) = inner.documents.get_mut(id) {
                doc.last_accessed = now_secs();
                doc.access_count += 1;
                Ok(Some(doc.clone()))
            } else {
                Ok(None)
            }
        })
    }

    fn update(&self, doc: Document) -> super::BoxFut<'_, ()> {
        self.index(doc)
    }

    fn delete<'a>(&'a self, id: &'a str) -> super::BoxFut<'a, ()> {
        Box::pin(async move {
            self.require_ready()?;
            let mut inner = self.inner.write().expect("store lock poisoned");
            if let Some(doc) = inner.documents.remove(id) {
                let collection_name = doc.doc_type.collection();
                if let Some(collection) = inner.collections.get_mut(collection_name) {
                    collection.document_count -= 1;
                    collection.updated_at = now_secs();
                }
            }
            Ok(())
        })
    }

    fn create_collection<'a>(&'a self, name: &'a str, dim: usize) -> super::BoxFut<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("store lock poisoned");
            inner
                .collections
                .entry(name.to_string())
                .or_insert_with(|| Collection::new(name, dim, crate::document::DistanceMetric::Cosine));
            Ok(())
        })
    }

    fn delete_collection<'a>(&'a self, name: &'a str) -> super::BoxFut<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("store lock poisoned");
            inner.collections.remove(name);
            Ok(())
        })
    }

    fn list_collections(&self) -> super::BoxFut<'_, Vec<Collection>> {
        Box::pin(async move {
            let inner = self.inner.read().expect("store lock poisoned");
            Ok(inner.collections.values().cloned().collect())
        })
    }

    fn get_stats(&self) -> super::BoxFut<'_, StoreStats> {
        Box::pin(async move {
            let inner = self.inner.read().expect("store lock poisoned");
            Ok(StoreStats {
                total_documents: inner.documents.len() as i64,
                total_collections: inner.collections.len() as i64,
            })
        })
    }

    fn get_collection_stats<'a>(&'a self, name: &'a str) -> super::BoxFut<'a, CollectionStats> {
        Box::pin(async move {
            let inner = self.inner.read().expect("store lock poisoned");
            Ok(inner
                .collections
                .get(name)
                .map(|c| CollectionStats { document_count: c.document_count, vector_size: c.vector_size })
                .unwrap_or_default())
        })
    }

    fn optimize(&self) -> super::BoxFut<'_, ()> {
        Box::pin(async move {
            tracing::debug!("optimize: no-op for in-memory store");
            Ok(())
        })
    }

    fn backup<'a>(&'a self, path: &'a str) -> super::BoxFut<'a, ()> {
        Box::pin(async move {
            let inner = self.inner.read().expect("store lock poisoned");
            let docs: Vec<&Document> = inner.documents.values().collect();
            let json = serde_json::to_vec_pretty(&docs)?;
            std::fs::write(path, json).map_err(|e| CoreError::Storage(format!("backup failed: {e}")))?;
            Ok(())
        })
    }

    fn restore<'a>(&'a self, _path: &'a str) -> super::BoxFut<'a, ()> {
        Box::pin(async move { Err(CoreError::NotImplemented("InMemoryDocumentStore::restore")) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentType;

    async fn store_with(docs: Vec<(&str, DocumentType, &str, Option<Vec<f32>>)>) -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        store.initialize().await.unwrap();
        for (id, doc_type, content, embedding) in docs {
            let mut doc = Document::new("conn-1", doc_type, content);
            doc.id = id.to_string();
            doc.embedding = embedding;
            store.index(doc).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn index_then_get_preserves_embedding_bit_for_bit() {
        let store = store_with(vec![("a", DocumentType::Schema, "users table", Some(vec![1.0, 2.0, 3.0]))]).await;
        let got = store.get("a").await.unwrap().unwrap();
        assert_eq!(got.embedding, Some(vec![1.0, 2.0, 3.0]));
    }

    #[tokio::test]
    async fn upsert_increments_collection_count_only_once() {
        let store = InMemoryDocumentStore::new();
        store.initialize().await.unwrap();

        let mut doc = Document::new("conn-1", DocumentType::Schema, "v1");
        doc.id = "dup".to_string();
        store.index(doc.clone()).await.unwrap();
        doc.content = "v2".to_string();
        store.index(doc).await.unwrap();

        let stats = store.get_collection_stats("schemas").await.unwrap();
        assert_eq!(stats.document_count, 1);

        let got = store.get("dup").await.unwrap().unwrap();
        assert_eq!(got.content, "v2");
    }

    #[tokio::test]
    async fn delete_decrements_collection_count() {
        let store = store_with(vec![("a", DocumentType::Schema, "x", None)]).await;
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        let stats = store.get_collection_stats("schemas").await.unwrap();
        assert_eq!(stats.document_count, 0);
    }

    #[tokio::test]
    async fn search_similar_k_zero_returns_empty() {
        let store = store_with(vec![("a", DocumentType::Schema, "x", Some(vec![1.0, 0.0]))]).await;
        let results = store.search_similar(&[1.0, 0.0], 0, &SearchFilter::default()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_similar_orders_by_cosine_desc() {
        let store = store_with(vec![
            ("a", DocumentType::Schema, "x", Some(vec![1.0, 0.0])),
            ("b", DocumentType::Schema, "y", Some(vec![0.0, 1.0])),
        ])
        .await;
        let results = store.search_similar(&[1.0, 0.0], 2, &SearchFilter::default()).await.unwrap();
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "b");
    }

    #[tokio::test]
    async fn filter_restricts_to_connection_and_type() {
        let store = InMemoryDocumentStore::new();
        store.initialize().await.unwrap();
        let mut a = Document::new("conn-1", DocumentType::Schema, "a");
        a.id = "a".into();
        a.embedding = Some(vec![1.0, 0.0]);
        let mut b = Document::new("conn-2", DocumentType::Schema, "b");
        b.id = "b".into();
        b.embedding = Some(vec![1.0, 0.0]);
        store.index(a).await.unwrap();
        store.index(b).await.unwrap();

        let filter = SearchFilter { connection_id: Some("conn-1".to_string()), doc_type: None };
        let results = store.search_similar(&[1.0, 0.0], 10, &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn unready_store_rejects_mutations() {
        let store = InMemoryDocumentStore::new();
        let doc = Document::new("conn-1", DocumentType::Schema, "x");
        assert!(store.index(doc).await.is_err());
    }

    #[tokio::test]
    async fn restore_is_not_implemented() {
        let store = InMemoryDocumentStore::new();
        store.initialize().await.unwrap();
        assert!(matches!(store.restore("x").await, Err(CoreError::NotImplemented(_))));
    }
}

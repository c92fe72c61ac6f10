//! Context Builder: embeds a query, fans out five retrieval workers under a
//! soft deadline, and merges whatever arrived into a `QueryContext`.
//!
//! The fan-out shape (spawn, `tokio::time::timeout`, join) follows the
//! teacher's `main.rs::shutdown_signal` / `budget/audit.rs` background-worker
//! idiom; no single teacher file does a five-way join like this.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::document::{Document, DocumentType, SearchFilter};
use crate::embedding::EmbeddingService;
use crate::error::CoreError;
use crate::patterns::PatternMatcher;
use crate::store::DocumentStore;

const BUILD_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SchemaContext {
    pub table_name: String,
    pub relevance: f32,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BusinessRule {
    pub rule: String,
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceHint {
    #[serde(rename = "type")]
    pub hint_type: String,
    pub impact: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_after: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DataStats {
    pub total_rows: i64,
    pub total_size_bytes: i64,
    pub last_analyzed: i64,
    pub growth_rate: f64,
    pub access_patterns: Vec<String>,
    pub distribution: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct QueryContext {
    pub query: String,
    pub relevant_schemas: Vec<SchemaContext>,
    pub similar_queries: Vec<Document>,
    pub business_rules: Vec<BusinessRule>,
    pub performance_hints: Vec<PerformanceHint>,
    pub data_statistics: DataStats,
    pub suggestions: Vec<Suggestion>,
    pub confidence: f32,
}

pub struct ContextBuilder<'a> {
    store: &'a dyn DocumentStore,
    embeddings: &'a EmbeddingService,
    deadline: Duration,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(store: &'a dyn DocumentStore, embeddings: &'a EmbeddingService) -> Self {
        Self { store, embeddings, deadline: BUILD_DEADLINE }
    }

    /// Used by tests that need a shorter soft deadline than the production
    /// 5-second default.
    pub fn with_deadline_secs(store: &'a dyn DocumentStore, embeddings: &'a EmbeddingService, secs: u64) -> Self {
        Self { store, embeddings, deadline: Duration::from_secs(secs) }
    }

    pub async fn build_context(&self, query: &str, connection_id: &str) -> Result<QueryContext, CoreError> {
        let embedding = self
            .embeddings
            .embed_text(query)
            .await
            .map_err(|e| CoreError::Embedding(format!("failed to embed query: {e}")))?;

        let (schemas, queries, rules, hints, stats) = tokio::join!(
            self.with_deadline("relevant_schemas", self.relevant_schemas(query, connection_id, &embedding)),
            self.with_deadline("similar_queries", self.similar_queries(connection_id, &embedding)),
            self.with_deadline("business_rules", self.business_rules(query, &embedding)),
            self.with_deadline("performance_hints", self.performance_hints(query, connection_id, &embedding)),
            self.with_deadline("data_statistics", self.data_statistics(connection_id)),
        );

        let relevant_schemas = schemas.unwrap_or_default();
        let similar_queries = queries.unwrap_or_default();
        let business_rules = rules.unwrap_or_default();
        let performance_hints = hints.unwrap_or_default();
        let data_statistics = stats.unwrap_or_default();

        let suggestions = build_suggestions(&similar_queries, &performance_hints);
        let confidence = compute_confidence(&relevant_schemas, &similar_queries, &business_rules, &performance_hints);

        Ok(QueryContext {
            query: query.to_string(),
            relevant_schemas,
            similar_queries,
            business_rules,
            performance_hints,
            data_statistics,
            suggestions,
            confidence,
        })
    }

    async fn with_deadline<T: Default, F>(&self, name: &str, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        match timeout(self.deadline, fut).await {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(worker = name, "context builder: soft deadline exceeded, proceeding without it");
                None
            }
        }
    }

    async fn relevant_schemas(&self, query: &str, connection_id: &str, embedding: &[f32]) -> Vec<SchemaContext> {
        let candidates = match self.store.hybrid_search(query, embedding, 20).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "relevant_schemas: hybrid search failed");
                return Vec::new();
            }
        };

        let mut schemas: Vec<SchemaContext> = candidates
            .into_iter()
            .filter(|d| d.doc_type == DocumentType::Schema)
            .filter(|d| connection_id.is_empty() || d.connection_id == connection_id)
            .map(|d| SchemaContext {
                table_name: d.metadata_str("table_name").unwrap_or_default().to_string(),
                relevance: d.score.unwrap_or(0.0),
                content: d.content,
            })
            .collect();

        schemas.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
        schemas.truncate(5);
        schemas
    }

    async fn similar_queries(&self, connection_id: &str, embedding: &[f32]) -> Vec<Document> {
        let filter = SearchFilter { connection_id: Some(connection_id.to_string()), doc_type: Some(DocumentType::Query) };
        let candidates = match self.store.search_similar(embedding, 20, &filter).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "similar_queries: vector search failed");
                return Vec::new();
            }
        };

        let mut patterns = PatternMatcher::default().extract_patterns(&candidates);
        patterns.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.frequency.cmp(&a.frequency))
        });
        patterns.truncate(10);

        let by_query: HashMap<&str, &Document> = candidates.iter().map(|d| (d.content.as_str(), d)).collect();
        patterns
            .into_iter()
            .filter_map(|p| by_query.get(p.query.as_str()).map(|d| (*d).clone()))
            .collect()
    }

    async fn business_rules(&self, query: &str, embedding: &[f32]) -> Vec<BusinessRule> {
        let filter = SearchFilter { connection_id: None, doc_type: Some(DocumentType::Business) };
        let candidates = match self.store.search_similar(embedding, 10, &filter).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "business_rules: vector search failed");
                return Vec::new();
            }
        };

        let query_lower = query.to_ascii_lowercase();
        let mut rules: Vec<BusinessRule> = candidates
            .into_iter()
            .filter(|d| {
                // `conditions` may be a single string or a list of strings
                // (spec §4.5 worker 3); retain the rule if any one of them
                // occurs as a substring of the (lowercased) query.
                d.metadata_str_list("conditions")
                    .iter()
                    .any(|c| query_lower.contains(&c.to_ascii_lowercase()))
            })
            .map(|d| BusinessRule {
                rule: d.content,
                priority: d.metadata.get("priority").and_then(|v| v.as_i64()).unwrap_or(0),
            })
            .collect();

        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        rules
    }

    async fn performance_hints(&self, query: &str, connection_id: &str, embedding: &[f32]) -> Vec<PerformanceHint> {
        let filter = SearchFilter { connection_id: Some(connection_id.to_string()), doc_type: Some(DocumentType::Performance) };
        let mut hints = match self.store.search_similar(embedding, 10, &filter).await {
            Ok(docs) => docs
                .into_iter()
                .map(|d| PerformanceHint {
                    hint_type: d.metadata_str("type").unwrap_or("general").to_string(),
                    impact: d.metadata_str("impact").unwrap_or("low").to_string(),
                    confidence: d.score.unwrap_or(0.5),
                    sql_before: None,
                    sql_after: None,
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "performance_hints: vector search failed");
                Vec::new()
            }
        };

        let lower = query.to_ascii_lowercase();
        if lower.contains("where") && !lower.contains("index") {
            hints.push(PerformanceHint {
                hint_type: "index".to_string(),
                impact: "high".to_string(),
                confidence: 0.7,
                sql_before: None,
                sql_after: None,
            });
        }
        if lower.contains("select *") {
            let sql_after = query.replacen('*', "specific_columns", 1);
            hints.push(PerformanceHint {
                hint_type: "rewrite".to_string(),
                impact: "medium".to_string(),
                confidence: 0.8,
                sql_before: Some(query.to_string()),
                sql_after: Some(sql_after),
            });
        }
        if lower.contains("between") || lower.contains("date") {
            hints.push(PerformanceHint {
                hint_type: "partition".to_string(),
                impact: "high".to_string(),
                confidence: 0.6,
                sql_before: None,
                sql_after: None,
            });
        }
        hints
    }

    async fn data_statistics(&self, connection_id: &str) -> DataStats {
        let stats = self.store.get_stats().await.unwrap_or_default();
        DataStats {
            total_rows: stats.total_documents,
            total_size_bytes: 0,
            last_analyzed: crate::document::now_secs(),
            growth_rate: 0.0,
            access_patterns: vec![format!("connection:{connection_id}")],
            distribution: HashMap::new(),
        }
    }
}

fn build_suggestions(similar_queries: &[Document], hints: &[PerformanceHint]) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = similar_queries
        .iter()
        .take(3)
        .map(|d| Suggestion {
            kind: "completion".to_string(),
            text: d.content.clone(),
            confidence: d.score.unwrap_or(0.0),
        })
        .collect();

    for hint in hints {
        if let Some(ref sql_after) = hint.sql_after {
            suggestions.push(Suggestion {
                kind: "optimization".to_string(),
                text: sql_after.clone(),
                confidence: hint.confidence,
            });
        }
    }
    suggestions
}

fn compute_confidence(
    schemas: &[SchemaContext],
    queries: &[Document],
    rules: &[BusinessRule],
    hints: &[PerformanceHint],
) -> f32 {
    let mut confidence = 0.0f32;
    let mut any_weight = false;

    if !schemas.is_empty() {
        let mean = schemas.iter().map(|s| s.relevance).sum::<f32>() / schemas.len() as f32;
        confidence += 0.3 * mean;
        any_weight = true;
    }
    if !queries.is_empty() {
        let mean = queries.iter().filter_map(|d| d.score).sum::<f32>() / queries.len() as f32;
        confidence += 0.3 * mean;
        any_weight = true;
    }
    if !rules.is_empty() {
        confidence += 0.2;
        any_weight = true;
    }
    if !hints.is_empty() {
        confidence += 0.2;
        any_weight = true;
    }

    if !any_weight {
        return 0.5;
    }
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::test_support::StubProvider;
    use crate::store::memory::InMemoryDocumentStore;
    use crate::store::DocumentStore as _;

    async fn ready_store() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn confidence_defaults_to_half_with_no_signal() {
        let store = ready_store().await;
        let embeddings = EmbeddingService::with_defaults(Box::new(StubProvider::new("stub", 4)));
        let builder = ContextBuilder::new(&store, &embeddings);

        let ctx = builder.build_context("select * from orders", "conn-1").await.unwrap();
        assert!((ctx.confidence - 0.5).abs() < 1e-6);
        assert!(ctx.relevant_schemas.is_empty());
        assert!(!ctx.data_statistics.access_patterns.is_empty());
    }

    #[tokio::test]
    async fn select_star_and_where_clause_trigger_hints() {
        let store = ready_store().await;
        let embeddings = EmbeddingService::with_defaults(Box::new(StubProvider::new("stub", 4)));
        let builder = ContextBuilder::new(&store, &embeddings);

        let ctx = builder.build_context("select * from orders where id = 1", "conn-1").await.unwrap();
        let kinds: Vec<&str> = ctx.performance_hints.iter().map(|h| h.hint_type.as_str()).collect();
        assert!(kinds.contains(&"index"));
        assert!(kinds.contains(&"rewrite"));

        let rewrite = ctx.performance_hints.iter().find(|h| h.hint_type == "rewrite").unwrap();
        assert_eq!(rewrite.sql_after.as_deref(), Some("select specific_columns from orders where id = 1"));
    }

    struct SleepySimilarStore {
        inner: InMemoryDocumentStore,
        sleep: Duration,
    }

    impl DocumentStore for SleepySimilarStore {
        fn initialize(&self) -> crate::store::BoxFut<'_, ()> {
            self.inner.initialize()
        }
        fn index(&self, doc: Document) -> crate::store::BoxFut<'_, ()> {
            self.inner.index(doc)
        }
        fn batch_index(&self, docs: Vec<Document>) -> crate::store::BoxFut<'_, ()> {
            self.inner.batch_index(docs)
        }
        fn search_similar<'a>(
            &'a self,
            embedding: &'a [f32],
            k: usize,
            filter: &'a SearchFilter,
        ) -> crate::store::BoxFut<'a, Vec<Document>> {
            Box::pin(async move {
                if filter.doc_type == Some(DocumentType::Schema) {
                    tokio::time::sleep(self.sleep).await;
                }
                self.inner.search_similar(embedding, k, filter).await
            })
        }
        fn search_by_text<'a>(
            &'a self,
            query: &'a str,
            k: usize,
            filter: &'a SearchFilter,
        ) -> crate::store::BoxFut<'a, Vec<Document>> {
            self.inner.search_by_text(query, k, filter)
        }
        fn hybrid_search<'a>(&'a self, query: &'a str, embedding: &'a [f32], k: usize) -> crate::store::BoxFut<'a, Vec<Document>> {
            Box::pin(async move {
                tokio::time::sleep(self.sleep).await;
                self.inner.hybrid_search(query, embedding, k).await
            })
        }
        fn get<'a>(&'a self, id: &'a str) -> crate::store::BoxFut<'a, Option<Document>> {
            self.inner.get(id)
        }
        fn update(&self, doc: Document) -> crate::store::BoxFut<'_, ()> {
            self.inner.update(doc)
        }
        fn delete<'a>(&'a self, id: &'a str) -> crate::store::BoxFut<'a, ()> {
            self.inner.delete(id)
        }
        fn create_collection<'a>(&'a self, name: &'a str, dim: usize) -> crate::store::BoxFut<'a, ()> {
            self.inner.create_collection(name, dim)
        }
        fn delete_collection<'a>(&'a self, name: &'a str) -> crate::store::BoxFut<'a, ()> {
            self.inner.delete_collection(name)
        }
        fn list_collections(&self) -> crate::store::BoxFut<'_, Vec<crate::document::Collection>> {
            self.inner.list_collections()
        }
        fn get_stats(&self) -> crate::store::BoxFut<'_, crate::store::StoreStats> {
            self.inner.get_stats()
        }
        fn get_collection_stats<'a>(&'a self, name: &'a str) -> crate::store::BoxFut<'a, crate::store::CollectionStats> {
            self.inner.get_collection_stats(name)
        }
        fn optimize(&self) -> crate::store::BoxFut<'_, ()> {
            self.inner.optimize()
        }
        fn backup<'a>(&'a self, path: &'a str) -> crate::store::BoxFut<'a, ()> {
            self.inner.backup(path)
        }
        fn restore<'a>(&'a self, path: &'a str) -> crate::store::BoxFut<'a, ()> {
            self.inner.restore(path)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_context_builder_timeout() {
        // spec §8 scenario 5, with tokio's paused virtual clock so the test
        // doesn't actually wait 5+ seconds of wall time.
        let inner = ready_store().await;
        let mut doc = Document::new("conn-1", DocumentType::Business, "refund policy");
        doc.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        doc.metadata.insert("conditions".into(), serde_json::json!("refund"));
        doc.metadata.insert("priority".into(), serde_json::json!(5));
        inner.index(doc).await.unwrap();

        let store = SleepySimilarStore { inner, sleep: Duration::from_secs(6) };
        let embeddings = EmbeddingService::with_defaults(Box::new(StubProvider::new("stub", 4)));
        let builder = ContextBuilder::with_deadline_secs(&store, &embeddings, 5);

        let start = tokio::time::Instant::now();
        let ctx = builder.build_context("refund request", "conn-1").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(5500));

        assert!(ctx.relevant_schemas.is_empty());
        assert!(!ctx.business_rules.is_empty());
        assert!(ctx.confidence >= 0.0 && ctx.confidence <= 1.0);
    }

    #[tokio::test]
    async fn business_rules_matches_condition_list() {
        // `conditions` stored as an array rather than a single string (spec
        // §4.5 worker 3) must still be checked against the query.
        let store = ready_store().await;
        let mut doc = Document::new("conn-1", DocumentType::Business, "refund policy");
        doc.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        doc.metadata.insert("conditions".into(), serde_json::json!(["chargeback", "refund"]));
        doc.metadata.insert("priority".into(), serde_json::json!(1));
        store.index(doc).await.unwrap();

        let embeddings = EmbeddingService::with_defaults(Box::new(StubProvider::new("stub", 4)));
        let builder = ContextBuilder::new(&store, &embeddings);
        let ctx = builder.build_context("refund request", "conn-1").await.unwrap();
        assert_eq!(ctx.business_rules.len(), 1);
        assert_eq!(ctx.business_rules[0].rule, "refund policy");
    }

    #[tokio::test]
    async fn confidence_is_always_bounded() {
        let store = ready_store().await;
        let mut doc = Document::new("conn-1", DocumentType::Schema, "orders schema");
        doc.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        store.index(doc).await.unwrap();

        let embeddings = EmbeddingService::with_defaults(Box::new(StubProvider::new("stub", 4)));
        let builder = ContextBuilder::new(&store, &embeddings);
        let ctx = builder.build_context("orders", "conn-1").await.unwrap();
        assert!(ctx.confidence >= 0.0 && ctx.confidence <= 1.0);
    }
}

//! Embedded `DocumentStore` backed by SurrealDB: HNSW vector index + BM25
//! full-text index, one table per collection so each collection can carry
//! its own vector dimension and distance metric.
//!
//! Grounded in the teacher's `cache/store.rs` schema/ANN idiom (`DEFINE
//! INDEX ... HNSW DIMENSION {dim} DIST {metric}`, the `<|k, METRIC|>`
//! operator, `vector::similarity::cosine()`), ported from the teacher's
//! vendored `srrldb` fork onto the published `surrealdb` crate.

use std::collections::HashMap;
use std::sync::RwLock as StdRwLock;

use serde::{Deserialize, Serialize};
use surrealdb::engine::local::Db;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

use crate::document::{now_secs, Collection, DistanceMetric, Document, DocumentType, SearchFilter};
use crate::error::CoreError;
use crate::vector::cosine;

use super::rrf::{self, RrfConfig};
use super::{BoxFut, CollectionStats, DocumentStore, StoreStats};

/// Over-fetch factor applied when an ANN probe must still be filtered
/// client-side (spec §4.4.2 documents x3 for RRF candidate generation).
const ANN_OVERFETCH: usize = 3;

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    id: String,
    connection_id: String,
    #[serde(rename = "type")]
    doc_type: String,
    content: String,
    metadata: serde_json::Map<String, serde_json::Value>,
    embedding: Option<Vec<f32>>,
    created_at: i64,
    updated_at: i64,
    last_accessed: i64,
    access_count: i64,
    /// Only ever populated by read queries that project `AS score`
    /// (`search_similar`'s cosine column, `search_by_text`'s BM25 column).
    /// Skipped on write — always `None` when built from a `Document` via
    /// `From<&Document>` — so it never collides with the SCHEMAFULL table's
    /// fixed field set on `index`/`update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

impl From<&Document> for Row {
    fn from(d: &Document) -> Self {
        Self {
            id: d.id.clone(),
            connection_id: d.connection_id.clone(),
            doc_type: d.doc_type.as_str().to_string(),
            content: d.content.clone(),
            metadata: d.metadata.clone(),
            embedding: d.embedding.clone(),
            created_at: d.created_at,
            updated_at: d.updated_at,
            last_accessed: d.last_accessed,
            access_count: d.access_count,
            score: None,
        }
    }
}

fn parse_doc_type(s: &str) -> Option<DocumentType> {
    match s {
        "schema" => Some(DocumentType::Schema),
        "query" => Some(DocumentType::Query),
        "plan" => Some(DocumentType::Plan),
        "result" => Some(DocumentType::Result),
        "business" => Some(DocumentType::Business),
        "performance" => Some(DocumentType::Performance),
        "memory" => Some(DocumentType::Memory),
        _ => None,
    }
}

impl Row {
    fn into_document(self) -> Option<Document> {
        Some(Document {
            id: self.id,
            connection_id: self.connection_id,
            doc_type: parse_doc_type(&self.doc_type)?,
            content: self.content,
            metadata: self.metadata,
            embedding: self.embedding,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_accessed: self.last_accessed,
            access_count: self.access_count,
            score: self.score.map(|s| s as f32),
            rrf_score: None,
            vector_rank: None,
            text_rank: None,
        })
    }
}

fn metric_clause(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "COSINE",
        DistanceMetric::Euclidean => "EUCLIDEAN",
        DistanceMetric::Dot => "DOT",
    }
}

pub struct SurrealDocumentStore {
    db: Surreal<Db>,
    collections: StdRwLock<HashMap<String, Collection>>,
    rrf_config: RrfConfig,
}

impl SurrealDocumentStore {
    /// Opens (or creates) a RocksDB-backed embedded database at `path`.
    #[cfg(feature = "store-persistent")]
    pub async fn persistent(path: &str) -> Result<Self, CoreError> {
        let db = Surreal::new::<surrealdb::engine::local::RocksDb>(path).await?;
        Self::from_db(db).await
    }

    /// Opens an in-memory database. Used for tests and ephemeral deployments.
    #[cfg(any(test, feature = "store-ephemeral"))]
    pub async fn ephemeral() -> Result<Self, CoreError> {
        let db = Surreal::new::<surrealdb::engine::local::Mem>(()).await?;
        Self::from_db(db).await
    }

    async fn from_db(db: Surreal<Db>) -> Result<Self, CoreError> {
        db.signin(Root { username: "root", password: "root" }).await.ok();
        db.use_ns("ragcore").use_db("retrieval").await?;

        let store = Self {
            db,
            collections: StdRwLock::new(HashMap::new()),
            rrf_config: RrfConfig::default(),
        };
        Ok(store)
    }

    async fn apply_collection_schema(&self, collection: &Collection) -> Result<(), CoreError> {
        let table = &collection.name;
        let metric = metric_clause(collection.distance_metric);
        let schema = format!(
            r#"
            DEFINE TABLE IF NOT EXISTS {table} SCHEMAFULL;
            DEFINE FIELD IF NOT EXISTS connection_id ON {table} TYPE string;
            DEFINE FIELD IF NOT EXISTS type ON {table} TYPE string;
            DEFINE FIELD IF NOT EXISTS content ON {table} TYPE string;
            DEFINE FIELD IF NOT EXISTS metadata ON {table} TYPE object;
            DEFINE FIELD IF NOT EXISTS embedding ON {table} TYPE option<array<float>>;
            DEFINE FIELD IF NOT EXISTS created_at ON {table} TYPE int;
            DEFINE FIELD IF NOT EXISTS updated_at ON {table} TYPE int;
            DEFINE FIELD IF NOT EXISTS last_accessed ON {table} TYPE int;
            DEFINE FIELD IF NOT EXISTS access_count ON {table} TYPE int;
            DEFINE INDEX IF NOT EXISTS idx_{table}_connection ON {table} FIELDS connection_id;
            DEFINE INDEX IF NOT EXISTS idx_{table}_type ON {table} FIELDS type;
            DEFINE INDEX IF NOT EXISTS idx_{table}_created ON {table} FIELDS created_at;
            DEFINE ANALYZER IF NOT EXISTS {table}_analyzer TOKENIZERS class FILTERS lowercase,snowball(english);
            DEFINE INDEX IF NOT EXISTS idx_{table}_fts ON {table} FIELDS content SEARCH ANALYZER {table}_analyzer BM25;
            DEFINE INDEX IF NOT EXISTS idx_{table}_hnsw ON {table} FIELDS embedding
                HNSW DIMENSION {dim} DIST {metric};
            "#,
            table = table,
            dim = collection.vector_size,
            metric = metric,
        );
        self.db.query(schema).await?.check()?;
        Ok(())
    }

    fn table_for(&self, doc_type: Option<DocumentType>) -> Vec<String> {
        match doc_type {
            Some(t) => vec![t.collection().to_string()],
            None => self.collections.read().expect("collections lock poisoned").keys().cloned().collect(),
        }
    }

    /// Join-and-scan fallback (spec §4.4.1), used when a table's HNSW probe
    /// errors (e.g. the index hasn't been built yet on a fresh collection).
    async fn brute_force_similar(&self, table: &str, embedding: &[f32]) -> Result<Vec<Row>, CoreError> {
        let sql = format!(
            "SELECT *, vector::similarity::cosine(embedding, $vec) AS score FROM {table} WHERE embedding != NONE"
        );
        let rows: Vec<Row> = self.db.query(sql).bind(("vec", embedding.to_vec())).await?.take(0)?;
        Ok(rows)
    }
}

impl DocumentStore for SurrealDocumentStore {
    fn initialize(&self) -> BoxFut<'_, ()> {
        Box::pin(async move {
            for collection in crate::document::default_collections() {
                self.apply_collection_schema(&collection).await?;
                self.collections.write().expect("collections lock poisoned").insert(collection.name.clone(), collection);
            }
            Ok(())
        })
    }

    fn index(&self, doc: Document) -> BoxFut<'_, ()> {
        Box::pin(async move {
            let table = doc.doc_type.collection();
            let row = Row::from(&doc);
            let is_new = self.db.select::<Option<Row>>((table, doc.id.as_str())).await?.is_none();

            self.db
                .query("UPSERT type::thing($tb, $id) CONTENT $row RETURN NONE")
                .bind(("tb", table.to_string()))
                .bind(("id", doc.id.clone()))
                .bind(("row", row))
                .await?
                .check()?;

            if is_new {
                let mut collections = self.collections.write().expect("collections lock poisoned");
                if let Some(c) = collections.get_mut(table) {
                    c.document_count += 1;
                    c.updated_at = now_secs();
                }
            }
            Ok(())
        })
    }

    fn batch_index(&self, docs: Vec<Document>) -> BoxFut<'_, ()> {
        Box::pin(async move {
            for doc in docs {
                let id = doc.id.clone();
                if let Err(e) = self.index(doc).await {
                    tracing::warn!(id = %id, error = %e, "batch_index: skipping row");
                }
            }
            Ok(())
        })
    }

    /// ANN path (spec §4.4.2): probes the table's HNSW index via the `<|n,
    /// METRIC|>` kNN operator instead of scanning every row, then applies
    /// filters client-side since the index has no notion of them. Over-fetches
    /// by [`ANN_OVERFETCH`] when a filter is present, since post-filtering can
    /// shrink the candidate set below `k`.
    fn search_similar<'a>(&'a self, embedding: &'a [f32], k: usize, filter: &'a SearchFilter) -> BoxFut<'a, Vec<Document>> {
        Box::pin(async move {
            if k == 0 {
                return Ok(Vec::new());
            }
            let probe_k = if filter.connection_id.is_some() || filter.doc_type.is_some() {
                k * ANN_OVERFETCH
            } else {
                k
            };

            let mut all = Vec::new();
            for table in self.table_for(filter.doc_type) {
                let sql = format!(
                    "SELECT *, vector::similarity::cosine(embedding, $vec) AS score FROM {table}
                     WHERE embedding <|{probe_k},COSINE|> $vec"
                );
                let rows: Vec<Row> = match self.db.query(sql).bind(("vec", embedding.to_vec())).await {
                    Ok(mut result) => result.take(0).unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!(table = %table, error = %e, "HNSW probe failed, falling back to full scan");
                        self.brute_force_similar(&table, embedding).await?
                    }
                };
                for row in rows {
                    if filter.connection_id.as_deref().is_some_and(|cid| cid != row.connection_id) {
                        continue;
                    }
                    if let Some(mut doc) = row.into_document() {
                        if let Some(e) = doc.embedding.as_ref() {
                            doc.score = Some(cosine(e, embedding));
                        }
                        all.push(doc);
                    }
                }
            }

            all.sort_by(|a, b| {
                b.score
                    .unwrap_or(0.0)
                    .partial_cmp(&a.score.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
            all.truncate(k);
            Ok(all)
        })
    }

    fn search_by_text<'a>(&'a self, query: &'a str, k: usize, filter: &'a SearchFilter) -> BoxFut<'a, Vec<Document>> {
        Box::pin(async move {
            if k == 0 {
                return Ok(Vec::new());
            }
            let mut all = Vec::new();
            for table in self.table_for(filter.doc_type) {
                let sql = if filter.connection_id.is_some() {
                    format!(
                        "SELECT *, search::score(0) AS score FROM {table}
                         WHERE content @0@ $q AND connection_id = $cid
                         ORDER BY score DESC LIMIT $k"
                    )
                } else {
                    format!(
                        "SELECT *, search::score(0) AS score FROM {table}
                         WHERE content @0@ $q
                         ORDER BY score DESC LIMIT $k"
                    )
                };
                let mut built = self.db.query(sql).bind(("q", query.to_string())).bind(("k", k as i64));
                if let Some(ref cid) = filter.connection_id {
                    built = built.bind(("cid", cid.clone()));
                }
                let result = built.await.map_err(|e| {
                    CoreError::Search(format!("full-text search unavailable: {e}"))
                })?;
                let rows: Vec<Row> = result.take(0).unwrap_or_default();
                for row in rows {
                    if let Some(doc) = row.into_document() {
                        all.push(doc);
                    }
                }
            }

            all.sort_by(|a, b| {
                b.score
                    .unwrap_or(0.0)
                    .partial_cmp(&a.score.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
            all.truncate(k);
            Ok(all)
        })
    }

    fn hybrid_search<'a>(&'a self, query: &'a str, embedding: &'a [f32], k: usize) -> BoxFut<'a, Vec<Document>> {
        Box::pin(async move {
            let candidate_count = 3 * k.max(1);
            let unfiltered = SearchFilter::default();

            let vector_results = self.search_similar(embedding, candidate_count, &unfiltered).await?;
            let text_results = match self.search_by_text(query, candidate_count, &unfiltered).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "text search failed during hybrid search, degrading to vector-only");
                    Vec::new()
                }
            };

            Ok(rrf::fuse(vector_results, text_results, k, self.rrf_config))
        })
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFut<'a, Option<Document>> {
        Box::pin(async move {
            for table in self.table_for(None) {
                if let Some(row) = self.db.select::<Option<Row>>((table.as_str(), id)).await? {
                    return Ok(row.into_document());
                }
            }
            Ok(None)
        })
    }

    fn update(&self, doc: Document) -> BoxFut<'_, ()> {
        self.index(doc)
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async move {
            for table in self.table_for(None) {
                let existed = self.db.select::<Option<Row>>((table.as_str(), id)).await?.is_some();
                if existed {
                    let _: Option<Row> = self.db.delete((table.as_str(), id)).await?;
                    let mut collections = self.collections.write().expect("collections lock poisoned");
                    if let Some(c) = collections.get_mut(&table) {
                        c.document_count -= 1;
                        c.updated_at = now_secs();
                    }
                }
            }
            Ok(())
        })
    }

    fn create_collection<'a>(&'a self, name: &'a str, dim: usize) -> BoxFut<'a, ()> {
        Box::pin(async move {
            let collection = Collection::new(name, dim, DistanceMetric::Cosine);
            self.apply_collection_schema(&collection).await?;
            self.collections.write().expect("collections lock poisoned").insert(name.to_string(), collection);
            Ok(())
        })
    }

    fn delete_collection<'a>(&'a self, name: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async move {
            self.db.query(format!("REMOVE TABLE IF EXISTS {name}")).await?.check()?;
            self.collections.write().expect("collections lock poisoned").remove(name);
            Ok(())
        })
    }

    fn list_collections(&self) -> BoxFut<'_, Vec<Collection>> {
        Box::pin(async move { Ok(self.collections.read().expect("collections lock poisoned").values().cloned().collect()) })
    }

    fn get_stats(&self) -> BoxFut<'_, StoreStats> {
        Box::pin(async move {
            let collections = self.collections.read().expect("collections lock poisoned");
            Ok(StoreStats {
                total_documents: collections.values().map(|c| c.document_count).sum(),
                total_collections: collections.len() as i64,
            })
        })
    }

    fn get_collection_stats<'a>(&'a self, name: &'a str) -> BoxFut<'a, CollectionStats> {
        Box::pin(async move {
            let collections = self.collections.read().expect("collections lock poisoned");
            Ok(collections
                .get(name)
                .map(|c| CollectionStats { document_count: c.document_count, vector_size: c.vector_size })
                .unwrap_or_default())
        })
    }

    fn optimize(&self) -> BoxFut<'_, ()> {
        Box::pin(async move {
            for table in self.table_for(None) {
                if let Err(e) = self.db.query(format!("REBUILD INDEX idx_{table}_hnsw ON {table}")).await {
                    tracing::warn!(table = %table, error = %e, "optimize: failed to rebuild HNSW index, continuing");
                }
            }
            Ok(())
        })
    }

    fn backup<'a>(&'a self, path: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async move {
            self.db.export(path).await?;
            Ok(())
        })
    }

    fn restore<'a>(&'a self, _path: &'a str) -> BoxFut<'a, ()> {
        Box::pin(async move { Err(CoreError::NotImplemented("SurrealDocumentStore::restore")) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ready_store() -> SurrealDocumentStore {
        let store = SurrealDocumentStore::ephemeral().await.expect("ephemeral init");
        store.initialize().await.expect("initialize");
        store
    }

    #[tokio::test]
    async fn index_and_get_round_trips_embedding() {
        let store = ready_store().await;
        let mut doc = Document::new("conn-1", DocumentType::Schema, "users table");
        doc.embedding = Some(vec![1.0, 0.0, 0.0]);
        doc.id = "doc-1".to_string();
        store.index(doc.clone()).await.unwrap();

        let got = store.get("doc-1").await.unwrap().unwrap();
        assert_eq!(got.embedding, doc.embedding);
    }

    #[tokio::test]
    async fn upsert_increments_collection_count_once() {
        let store = ready_store().await;
        let mut doc = Document::new("conn-1", DocumentType::Schema, "v1");
        doc.id = "dup".to_string();
        store.index(doc.clone()).await.unwrap();
        doc.content = "v2".to_string();
        store.index(doc).await.unwrap();

        let stats = store.get_collection_stats("schemas").await.unwrap();
        assert_eq!(stats.document_count, 1);
    }

    /// `search_by_text` with `filter.doc_type == None` fans the query out
    /// across every collection's table and must merge + re-sort before
    /// truncating to `k`, not concatenate each table's already-sorted slice
    /// in whatever order `table_for` happened to yield them (spec §4.4.3,
    /// §5's ordering guarantee).
    #[tokio::test]
    async fn search_by_text_is_globally_ordered_across_tables() {
        let store = ready_store().await;

        let mut a = Document::new("conn-1", DocumentType::Schema, "refund policy explained here");
        a.id = "id-a".to_string();
        a.created_at = 1000;
        let mut b = Document::new("conn-1", DocumentType::Business, "refund policy explained here");
        b.id = "id-b".to_string();
        b.created_at = 1000;
        store.index(a).await.unwrap();
        store.index(b).await.unwrap();

        let results = store.search_by_text("refund policy", 2, &SearchFilter::default()).await.unwrap();
        assert_eq!(results.len(), 2);
        // Identical content in single-document tables ties on BM25 score and
        // on created_at; the id-ascending tie-break must hold regardless of
        // which table's rows landed in `all` first.
        assert_eq!(results[0].id, "id-a");
        assert_eq!(results[1].id, "id-b");
    }
}

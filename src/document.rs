//! Core data model: documents, collections, and the type → collection routing rule.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `id`, `connection_id`, `type` partition the store; every other field is payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub connection_id: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_accessed: i64,
    #[serde(default)]
    pub access_count: i64,

    /// Transient, query-time only fields. Never persisted.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rrf_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vector_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text_rank: Option<usize>,
}

impl Document {
    pub fn new(connection_id: impl Into<String>, doc_type: DocumentType, content: impl Into<String>) -> Self {
        let now = now_secs();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.into(),
            doc_type,
            content: content.into(),
            metadata: serde_json::Map::new(),
            embedding: None,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            access_count: 0,
            score: None,
            rrf_score: None,
            vector_rank: None,
            text_rank: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Metadata value lookup that treats a missing or type-mismatched key as absent,
    /// never as an error (spec §9's dynamic-metadata rule).
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn metadata_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.metadata.get(key).and_then(Value::as_array)
    }

    /// Same lookup as [`Self::metadata_str`], but also accepts an array of
    /// strings (a document may carry one condition or several under the same
    /// key). A single string is returned as a one-element list; non-string
    /// array entries are skipped rather than treated as an error.
    pub fn metadata_str_list(&self, key: &str) -> Vec<&str> {
        match self.metadata.get(key) {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Schema,
    Query,
    Plan,
    Result,
    Business,
    Performance,
    Memory,
}

impl DocumentType {
    /// Fixed document-type -> collection routing rule (spec §3).
    pub fn collection(self) -> &'static str {
        match self {
            DocumentType::Schema => "schemas",
            DocumentType::Query | DocumentType::Plan | DocumentType::Result => "queries",
            DocumentType::Performance => "performance",
            DocumentType::Business => "business",
            DocumentType::Memory => "memory",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Schema => "schema",
            DocumentType::Query => "query",
            DocumentType::Plan => "plan",
            DocumentType::Result => "result",
            DocumentType::Business => "business",
            DocumentType::Performance => "performance",
            DocumentType::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub name: String,
    pub vector_size: usize,
    pub distance_metric: DistanceMetric,
    pub document_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Collection {
    pub fn new(name: impl Into<String>, vector_size: usize, distance_metric: DistanceMetric) -> Self {
        let now = now_secs();
        Self {
            name: name.into(),
            vector_size,
            distance_metric,
            document_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The five default collections seeded at store initialization (spec §6).
pub fn default_collections() -> Vec<Collection> {
    vec![
        Collection::new("schemas", 1536, DistanceMetric::Cosine),
        Collection::new("queries", 1536, DistanceMetric::Cosine),
        Collection::new("performance", 1536, DistanceMetric::Euclidean),
        Collection::new("business", 1536, DistanceMetric::Cosine),
        Collection::new("memory", 1536, DistanceMetric::Cosine),
    ]
}

/// Filter map recognized by vector/text/hybrid search. Unknown keys are ignored
/// (forward-compat, spec §4.4).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub connection_id: Option<String>,
    pub doc_type: Option<DocumentType>,
}

impl SearchFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(ref cid) = self.connection_id {
            if &doc.connection_id != cid {
                return false;
            }
        }
        if let Some(dt) = self.doc_type {
            if doc.doc_type != dt {
                return false;
            }
        }
        true
    }
}

/// A tagged-value metadata mapping, per spec §9. `serde_json::Map` already
/// satisfies the "string -> scalar | list | nested map" requirement, so this
/// alias exists only to give the concept a name at call sites.
pub type Metadata = serde_json::Map<String, Value>;

// Enforce mutual exclusivity of storage backend features at compile time.
#[cfg(all(feature = "store-persistent", feature = "store-ephemeral"))]
compile_error!(
    "Features `store-persistent` and `store-ephemeral` are mutually exclusive. \
     Please enable only one."
);

pub mod budget;
pub mod cache;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod patterns;
pub mod schema_enricher;
pub mod store;
pub mod vector;

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::store::DocumentStore;
use std::sync::Arc;

/// Owns the collaborators a caller wires a [`context::ContextBuilder`] from:
/// the document store, the embedding service, and the resolved config. Not
/// required by the library API itself — `ContextBuilder::new` only borrows
/// its two collaborators directly — but it's the shape the demo binary (and
/// any future host service) assembles once at startup and clones around.
#[derive(Clone)]
pub struct RetrievalCore {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub embeddings: Arc<EmbeddingService>,
}

impl RetrievalCore {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, embeddings: EmbeddingService) -> Self {
        Self { config: Arc::new(config), store, embeddings: Arc::new(embeddings) }
    }
}

//! Document Store: persistent documents + embeddings + inverted-index text,
//! behind a single interface with three permitted concrete backends.

pub mod memory;
pub mod rrf;
pub mod surreal;

use std::future::Future;
use std::pin::Pin;

use crate::document::{Collection, Document, SearchFilter};
use crate::error::CoreError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total_documents: i64,
    pub total_collections: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    pub document_count: i64,
    pub vector_size: usize,
}

pub(crate) type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send + 'a>>;

/// The 18-method document store interface (spec §4.4), language-independent.
/// Object-safe via boxed futures, the same shape the teacher uses for its
/// `LlmProvider` trait.
pub trait DocumentStore: Send + Sync {
    fn initialize(&self) -> BoxFut<'_, ()>;

    fn index(&self, doc: Document) -> BoxFut<'_, ()>;
    fn batch_index(&self, docs: Vec<Document>) -> BoxFut<'_, ()>;

    fn search_similar<'a>(
        &'a self,
        embedding: &'a [f32],
        k: usize,
        filter: &'a SearchFilter,
    ) -> BoxFut<'a, Vec<Document>>;

    fn search_by_text<'a>(
        &'a self,
        query: &'a str,
        k: usize,
        filter: &'a SearchFilter,
    ) -> BoxFut<'a, Vec<Document>>;

    fn hybrid_search<'a>(&'a self, query: &'a str, embedding: &'a [f32], k: usize) -> BoxFut<'a, Vec<Document>>;

    fn get<'a>(&'a self, id: &'a str) -> BoxFut<'a, Option<Document>>;
    fn update(&self, doc: Document) -> BoxFut<'_, ()>;
    fn delete<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()>;

    fn create_collection<'a>(&'a self, name: &'a str, dim: usize) -> BoxFut<'a, ()>;
    fn delete_collection<'a>(&'a self, name: &'a str) -> BoxFut<'a, ()>;
    fn list_collections(&self) -> BoxFut<'_, Vec<Collection>>;

    fn get_stats(&self) -> BoxFut<'_, StoreStats>;
    fn get_collection_stats<'a>(&'a self, name: &'a str) -> BoxFut<'a, CollectionStats>;

    fn optimize(&self) -> BoxFut<'_, ()>;
    fn backup<'a>(&'a self, path: &'a str) -> BoxFut<'a, ()>;
    fn restore<'a>(&'a self, path: &'a str) -> BoxFut<'a, ()>;
}

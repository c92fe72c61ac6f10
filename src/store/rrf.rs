//! Reciprocal Rank Fusion: combines a vector-search ranking and a text-search
//! ranking into one score, without requiring the two scores to be
//! comparable (spec §4.4.4).

use std::collections::HashMap;

use crate::document::Document;

pub const DEFAULT_RRF_CONSTANT: f64 = 60.0;
pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    pub constant: f64,
    pub vector_weight: f64,
    pub text_weight: f64,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            constant: DEFAULT_RRF_CONSTANT,
            vector_weight: DEFAULT_WEIGHT,
            text_weight: DEFAULT_WEIGHT,
        }
    }
}

/// `rrf(doc) = w_v / (rank_v + 1 + c) + w_t / (rank_t + 1 + c)`, contributing
/// a term only when the document appears in that list. Annotates each
/// surviving document's `vector_rank`/`text_rank`/`rrf_score`/`score`,
/// sorts by `rrf_score` descending, and truncates to `k`.
pub fn fuse(vector_results: Vec<Document>, text_results: Vec<Document>, k: usize, config: RrfConfig) -> Vec<Document> {
    let mut vector_rank_of: HashMap<String, usize> = HashMap::new();
    for (rank, doc) in vector_results.iter().enumerate() {
        vector_rank_of.entry(doc.id.clone()).or_insert(rank);
    }

    let mut text_rank_of: HashMap<String, usize> = HashMap::new();
    for (rank, doc) in text_results.iter().enumerate() {
        text_rank_of.entry(doc.id.clone()).or_insert(rank);
    }

    let mut by_id: HashMap<String, Document> = HashMap::new();
    for doc in vector_results.into_iter().chain(text_results) {
        by_id.entry(doc.id.clone()).or_insert(doc);
    }

    let mut fused: Vec<Document> = by_id
        .into_values()
        .map(|mut doc| {
            let mut score = 0.0f64;

            if let Some(&rank_v) = vector_rank_of.get(&doc.id) {
                score += config.vector_weight / (rank_v as f64 + 1.0 + config.constant);
                doc.vector_rank = Some(rank_v + 1);
            }
            if let Some(&rank_t) = text_rank_of.get(&doc.id) {
                score += config.text_weight / (rank_t as f64 + 1.0 + config.constant);
                doc.text_rank = Some(rank_t + 1);
            }

            doc.rrf_score = Some(score);
            doc.score = Some(score as f32);
            doc
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .unwrap_or(0.0)
            .partial_cmp(&a.rrf_score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    fused.truncate(k);
    fused
}

//! Pattern / Rule extractors (spec §4.8): narrow placeholder components
//! consumed by the Context Builder and the excluded NL2SQL layer. Only
//! `PatternMatcher` and `SQLValidator` have behavior the core spec requires;
//! the rest exist so the interface a downstream rewriter consumes is honest
//! about its shape without this crate fabricating their full logic.

use crate::document::Document;

/// One distinct usage pattern extracted from a set of query documents.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPattern {
    pub query: String,
    pub similarity: f32,
    pub frequency: u32,
    pub avg_execution_time_ms: f64,
    pub last_used: i64,
}

/// Groups query documents into patterns. The default strategy treats every
/// document as its own pattern (`frequency = 1`) — grouping near-duplicate
/// queries into a single pattern with a higher frequency is the kind of
/// refinement the excluded NL2SQL layer is free to add on top.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternMatcher;

impl PatternMatcher {
    pub fn extract_patterns(&self, docs: &[Document]) -> Vec<QueryPattern> {
        docs.iter()
            .map(|d| QueryPattern {
                query: d.content.clone(),
                similarity: d.score.unwrap_or(0.0),
                frequency: 1,
                avg_execution_time_ms: d
                    .metadata
                    .get("avg_execution_time_ms")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0),
                last_used: d.last_accessed,
            })
            .collect()
    }
}

/// A syntactic problem found in a candidate SQL string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct SqlValidationIssue {
    pub message: String,
}

/// Lightweight syntax sanity checks, used to attach warnings to generated
/// SQL — never to fail retrieval (spec §4.8).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn validate(&self, sql: &str) -> Result<(), SqlValidationIssue> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(SqlValidationIssue { message: "empty SQL".to_string() });
        }
        if trimmed.matches('(').count() != trimmed.matches(')').count() {
            return Err(SqlValidationIssue { message: "unbalanced parentheses".to_string() });
        }
        if trimmed.matches('\'').count() % 2 != 0 {
            return Err(SqlValidationIssue { message: "unterminated string literal".to_string() });
        }
        let first_word = trimmed.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
        const STATEMENT_KEYWORDS: &[&str] = &["SELECT", "WITH", "INSERT", "UPDATE", "DELETE"];
        if !STATEMENT_KEYWORDS.contains(&first_word.as_str()) {
            return Err(SqlValidationIssue { message: format!("unrecognized statement keyword: {first_word}") });
        }
        Ok(())
    }
}

/// Counts join clauses in a candidate SQL string; used by the excluded
/// NL2SQL layer to decide whether extra schema context is worth fetching.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinDetector;

impl JoinDetector {
    pub fn count_joins(&self, sql: &str) -> usize {
        sql.to_ascii_uppercase().matches("JOIN").count()
    }
}

/// Surfaces the table names a rewritten query references, keyed off
/// metadata the indexer already attached to `schema` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaAnalyzer;

impl SchemaAnalyzer {
    pub fn referenced_tables(&self, schema_docs: &[Document]) -> Vec<String> {
        schema_docs.iter().filter_map(|d| d.metadata_str("table_name").map(str::to_string)).collect()
    }
}

/// Rough cardinality estimate for a candidate query plan, used only as an
/// ordering hint by the excluded NL2SQL layer — never SQL execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsCollector;

impl StatsCollector {
    pub fn estimate_row_count(&self, total_rows: i64, join_count: usize) -> i64 {
        if join_count == 0 {
            total_rows
        } else {
            total_rows / (join_count as i64 + 1)
        }
    }
}

/// Ranks candidate rewritten queries by a rough cost proxy (join count, then
/// text length as a tie-break) — a stand-in for the excluded NL2SQL layer's
/// real query planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn rank_candidates(&self, candidates: &[String]) -> Vec<String> {
        let detector = JoinDetector;
        let mut ranked: Vec<String> = candidates.to_vec();
        ranked.sort_by_key(|c| (detector.count_joins(c), c.len()));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentType;

    #[test]
    fn pattern_matcher_default_is_one_pattern_per_document() {
        let mut a = Document::new("conn", DocumentType::Query, "select * from orders");
        a.score = Some(0.9);
        let mut b = Document::new("conn", DocumentType::Query, "select * from users");
        b.score = Some(0.5);

        let patterns = PatternMatcher.extract_patterns(&[a, b]);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].frequency, 1);
        assert!((patterns[0].similarity - 0.9).abs() < 1e-6);
    }

    #[test]
    fn sql_validator_flags_empty_and_unbalanced_and_unrecognized() {
        assert!(SqlValidator.validate("").is_err());
        assert!(SqlValidator.validate("SELECT * FROM t WHERE (a = 1").is_err());
        assert!(SqlValidator.validate("DROP everything").is_err());
        assert!(SqlValidator.validate("SELECT 1").is_ok());
    }

    #[test]
    fn sql_validator_flags_unterminated_string() {
        assert!(SqlValidator.validate("SELECT 'unterminated").is_err());
        assert!(SqlValidator.validate("SELECT 'ok'").is_ok());
    }

    #[test]
    fn join_detector_counts_case_insensitively() {
        assert_eq!(JoinDetector.count_joins("select * from a join b left join c"), 2);
    }

    #[test]
    fn query_planner_prefers_fewer_joins() {
        let ranked = QueryPlanner.rank_candidates(&[
            "select * from a join b join c".to_string(),
            "select * from a".to_string(),
        ]);
        assert_eq!(ranked[0], "select * from a");
    }
}

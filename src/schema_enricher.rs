//! Schema Enricher (spec §4.6): samples column statistics from the
//! connection's target database — a collaborator this crate only talks to
//! through [`StatsSource`], since the concrete SQL execution engine is out
//! of scope (spec §1).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read-only sampling surface the enricher needs from a connection's target
/// database. Each method degrades to its zero value on error rather than
/// failing the whole column — spec §4.6 treats every subquery as independent.
pub trait StatsSource: Send + Sync {
    fn distinct_count<'a>(&'a self, schema: &'a str, table: &'a str, column: &'a str) -> BoxFut<'a, Option<i64>>;

    fn top_values<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        column: &'a str,
        limit: usize,
    ) -> BoxFut<'a, Option<Vec<(String, i64)>>>;

    fn numeric_stats<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        column: &'a str,
    ) -> BoxFut<'a, Option<(f64, f64, f64)>>;

    fn sample_values<'a>(
        &'a self,
        schema: &'a str,
        table: &'a str,
        column: &'a str,
        limit: usize,
    ) -> BoxFut<'a, Option<Vec<String>>>;

    fn null_count<'a>(&'a self, schema: &'a str, table: &'a str, column: &'a str) -> BoxFut<'a, Option<i64>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnStatistics {
    pub distinct_count: i64,
    pub null_count: i64,
    pub sample_values: Vec<String>,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub top_values: HashMap<String, i64>,
}

const CATEGORICAL_DISTINCT_CEILING: i64 = 50;
const TOP_K: usize = 10;
const SAMPLE_K: usize = 5;

const NUMERIC_MARKERS: &[&str] =
    &["int", "integer", "bigint", "smallint", "decimal", "numeric", "float", "double", "real"];
const CATEGORICAL_MARKERS: &[&str] = &["enum", "bool"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Categorical,
    Numeric,
    Sample,
}

fn select_strategy(data_type: &str, distinct_count: Option<i64>) -> Strategy {
    let lower = data_type.to_ascii_lowercase();
    if CATEGORICAL_MARKERS.iter().any(|m| lower.contains(m))
        || distinct_count.is_some_and(|c| c > 0 && c < CATEGORICAL_DISTINCT_CEILING)
    {
        Strategy::Categorical
    } else if NUMERIC_MARKERS.iter().any(|m| lower.contains(m)) {
        Strategy::Numeric
    } else {
        Strategy::Sample
    }
}

pub struct SchemaEnricher<'a> {
    source: &'a dyn StatsSource,
}

impl<'a> SchemaEnricher<'a> {
    pub fn new(source: &'a dyn StatsSource) -> Self {
        Self { source }
    }

    /// Produces `ColumnStatistics` for `(schema, table, column, data_type)`.
    /// Each subquery is independent; a failed or absent one leaves its
    /// fields zero-valued rather than failing the whole call.
    pub async fn enrich(&self, schema: &str, table: &str, column: &str, data_type: &str) -> ColumnStatistics {
        let distinct_count = self.source.distinct_count(schema, table, column).await;
        let null_count = self.source.null_count(schema, table, column).await.unwrap_or(0);

        let mut stats = ColumnStatistics { null_count, distinct_count: distinct_count.unwrap_or(0), ..Default::default() };

        match select_strategy(data_type, distinct_count) {
            Strategy::Categorical => {
                if let Some(pairs) = self.source.top_values(schema, table, column, TOP_K).await {
                    stats.top_values = pairs.into_iter().collect();
                }
            }
            Strategy::Numeric => {
                if let Some((min, max, avg)) = self.source.numeric_stats(schema, table, column).await {
                    stats.min = min;
                    stats.max = max;
                    stats.avg = avg;
                }
            }
            Strategy::Sample => {
                if let Some(samples) = self.source.sample_values(schema, table, column, SAMPLE_K).await {
                    stats.sample_values = samples;
                }
            }
        }

        stats
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::StubStatsSource;
    use super::*;

    #[tokio::test]
    async fn categorical_strategy_fetches_top_values() {
        let mut source = StubStatsSource::default();
        source.distinct.insert(("public".into(), "orders".into(), "status".into()), 4);
        source.top.insert(
            ("public".into(), "orders".into(), "status".into()),
            vec![("shipped".into(), 120), ("pending".into(), 30)],
        );

        let enricher = SchemaEnricher::new(&source);
        let stats = enricher.enrich("public", "orders", "status", "varchar").await;
        assert_eq!(stats.distinct_count, 4);
        assert_eq!(stats.top_values.get("shipped"), Some(&120));
        assert_eq!(stats.min, 0.0);
    }

    #[tokio::test]
    async fn numeric_strategy_fetches_min_max_avg() {
        let mut source = StubStatsSource::default();
        source.numeric.insert(("public".into(), "orders".into(), "total".into()), (0.0, 999.5, 42.3));

        let enricher = SchemaEnricher::new(&source);
        let stats = enricher.enrich("public", "orders", "total", "decimal(10,2)").await;
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 999.5);
        assert!((stats.avg - 42.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fallback_strategy_fetches_samples() {
        let mut source = StubStatsSource::default();
        source.samples.insert(
            ("public".into(), "orders".into(), "notes".into()),
            vec!["a".into(), "b".into(), "c".into()],
        );

        let enricher = SchemaEnricher::new(&source);
        let stats = enricher.enrich("public", "orders", "notes", "text").await;
        assert_eq!(stats.sample_values, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failed_subquery_leaves_zero_valued_fields() {
        let mut source = StubStatsSource::default();
        source.fail_numeric = true;

        let enricher = SchemaEnricher::new(&source);
        let stats = enricher.enrich("public", "orders", "total", "integer").await;
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 0.0);
        assert_eq!(stats.avg, 0.0);
    }

    #[test]
    fn categorical_selected_below_ceiling_even_without_marker() {
        assert_eq!(select_strategy("varchar", Some(10)), Strategy::Categorical);
        assert_eq!(select_strategy("varchar", Some(50)), Strategy::Sample);
        assert_eq!(select_strategy("bigint", Some(1000)), Strategy::Numeric);
    }
}

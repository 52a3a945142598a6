//! Typed read helpers over a provisioned hypertable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{
    CandlestickAggregateOptions, CompressionSelect, TimeBucketConfig, TimeRange,
};
use crate::ddl::Hypertable;
use crate::error::OrchestratorError;
use crate::executor::{QueryExecutor, Row};
use crate::query::parse::Candlestick;
use crate::query::CandlestickQueryBuilder;
use crate::sql::where_clause::WhereClause;

/// One bucket from a time-bucket query: the bucket rendered as an
/// ISO-8601 UTC string plus the metric values by alias. Metrics that came
/// back NULL (empty buckets) are absent from the map.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBucketRow {
    pub interval: String,
    pub metrics: BTreeMap<String, f64>,
}

/// One bucket from a candlestick query.
#[derive(Debug, Clone, PartialEq)]
pub struct CandlestickRow {
    pub bucket_time: DateTime<Utc>,
    pub candlestick: Candlestick,
}

/// Chunk counts from `hypertable_compression_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionStats {
    pub total_chunks: i64,
    pub compressed_chunks: i64,
}

/// Read-side facade binding a [`Hypertable`] to a [`QueryExecutor`].
pub struct HypertableRepository<'a, E> {
    executor: &'a E,
    hypertable: &'a Hypertable,
}

impl<'a, E: QueryExecutor> HypertableRepository<'a, E> {
    pub fn new(executor: &'a E, hypertable: &'a Hypertable) -> Self {
        HypertableRepository {
            executor,
            hypertable,
        }
    }

    /// Runs a time-bucket query and maps each row into a [`TimeBucketRow`].
    pub async fn get_time_bucket(
        &self,
        config: TimeBucketConfig,
        range: &TimeRange,
        where_clause: Option<&WhereClause>,
    ) -> Result<Vec<TimeBucketRow>, OrchestratorError> {
        let aliases: Vec<String> = config
            .metrics
            .iter()
            .enumerate()
            .map(|(index, metric)| {
                metric
                    .alias
                    .clone()
                    .unwrap_or_else(|| format!("metric_{index}"))
            })
            .collect();

        let query = self
            .hypertable
            .time_bucket(config)
            .build(Some(range), where_clause)?;
        let rows = self.executor.execute(&query.sql, &query.params).await?;

        rows.iter()
            .map(|row| {
                let interval = text_field(row, "interval")?;
                let mut metrics = BTreeMap::new();
                for alias in &aliases {
                    if let Some(value) = optional_number(row, alias)? {
                        metrics.insert(alias.clone(), value);
                    }
                }
                Ok(TimeBucketRow { interval, metrics })
            })
            .collect()
    }

    /// Runs a candlestick query. The time column defaults to the
    /// hypertable's partition column when the options leave it unset.
    pub async fn get_candlesticks(
        &self,
        options: CandlestickAggregateOptions,
        range: &TimeRange,
        where_clause: Option<&WhereClause>,
    ) -> Result<Vec<CandlestickRow>, OrchestratorError> {
        let mut builder = CandlestickQueryBuilder::new(self.hypertable.name(), options.clone());
        if options.time_column.is_none() {
            builder = builder.with_time_column(self.hypertable.time_column());
        }

        let query = builder.build(Some(range), where_clause)?;
        let rows = self.executor.execute(&query.sql, &query.params).await?;

        rows.iter()
            .map(|row| {
                Ok(CandlestickRow {
                    bucket_time: timestamp_field(row, "bucket_time")?,
                    candlestick: Candlestick {
                        open: number_field(row, "open")?,
                        high: number_field(row, "high")?,
                        low: number_field(row, "low")?,
                        close: number_field(row, "close")?,
                        open_time: timestamp_field(row, "open_time")?,
                        high_time: timestamp_field(row, "high_time")?,
                        low_time: timestamp_field(row, "low_time")?,
                        close_time: timestamp_field(row, "close_time")?,
                        volume: optional_number(row, "volume")?,
                        vwap: optional_number(row, "vwap")?,
                    },
                })
            })
            .collect()
    }

    /// Fetches chunk compression counts, treating an empty result (no
    /// chunks yet) as zeros.
    pub async fn get_compression_stats(
        &self,
        select: &CompressionSelect,
    ) -> Result<CompressionStats, OrchestratorError> {
        let sql = self.hypertable.compression_stats(select)?;
        let rows = self.executor.execute(&sql, &[]).await?;

        let Some(row) = rows.first() else {
            return Ok(CompressionStats::default());
        };

        Ok(CompressionStats {
            total_chunks: optional_number(row, "total_chunks")?.unwrap_or(0.0) as i64,
            compressed_chunks: optional_number(row, "compressed_chunks")?.unwrap_or(0.0) as i64,
        })
    }
}

fn text_field(row: &Row, key: &str) -> Result<String, OrchestratorError> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OrchestratorError::Decode(format!("missing text column '{key}'")))
}

fn number_field(row: &Row, key: &str) -> Result<f64, OrchestratorError> {
    optional_number(row, key)?
        .ok_or_else(|| OrchestratorError::Decode(format!("missing numeric column '{key}'")))
}

/// Numeric fields may arrive as JSON numbers or as the text rendering of
/// a NUMERIC value; NULL maps to `None`.
fn optional_number(row: &Row, key: &str) -> Result<Option<f64>, OrchestratorError> {
    match row.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s.parse::<f64>().map(Some).map_err(|_| {
            OrchestratorError::Decode(format!("column '{key}' is not numeric: '{s}'"))
        }),
        Some(other) => Err(OrchestratorError::Decode(format!(
            "column '{key}' is not numeric: {other}"
        ))),
    }
}

fn timestamp_field(row: &Row, key: &str) -> Result<DateTime<Utc>, OrchestratorError> {
    let raw = text_field(row, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::Decode(format!("column '{key}' is not a timestamp: {e}")))
}

//! Configuration shapes for every schema object kind.
//!
//! These are plain values: hosts can deserialize them from JSON/YAML or
//! build them in code, and the compiler never assumes where they came
//! from. Strict kinds reject unknown fields at deserialization time so
//! malformed input fails before any SQL is built.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Range-partitioning dimension for a hypertable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByRange {
    /// Time column the hypertable is partitioned by
    pub column_name: String,
}

/// Background compression policy schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionPolicy {
    /// How often the policy job runs, e.g. `"1 day"`
    pub schedule_interval: String,
}

/// Native compression settings for a hypertable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSpec {
    /// Whether compression is enabled at all
    pub compress: bool,
    /// Column the compressed batches are ordered by
    pub compress_orderby: String,
    /// Column the compressed batches are segmented by
    pub compress_segmentby: String,
    /// Chunk time interval, defaults to `"1 day"` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_time_interval: Option<String>,
    /// Optional background compression policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<CompressionPolicy>,
}

/// Options for converting a table into a hypertable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHypertableOptions {
    pub by_range: ByRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionSpec>,
}

/// Options for the `timescaledb` extension itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateExtensionOptions {
    /// Emit `CASCADE` on create/drop
    #[serde(default)]
    pub should_cascade: bool,
    /// Pin a specific extension version on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Column selection for the compression statistics query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionSelect {
    #[serde(default)]
    pub total_chunks: bool,
    #[serde(default)]
    pub compressed_chunks: bool,
}

/// Aggregate expression kinds available in a continuous aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    Bucket,
    Candlestick,
}

/// One aggregate column in a continuous aggregate view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateColumnOptions {
    #[serde(rename = "type")]
    pub aggregate_type: AggregateType,
    /// Source column; required for every kind except `count` and `candlestick`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Output alias; defaults to the aggregate's key in the map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_alias: Option<String>,
    /// Time column, for `candlestick` aggregates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_column: Option<String>,
    /// Price column, for `candlestick` aggregates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_column: Option<String>,
    /// Volume column, for `candlestick` aggregates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_column: Option<String>,
}

impl AggregateColumnOptions {
    pub fn of_type(aggregate_type: AggregateType) -> Self {
        AggregateColumnOptions {
            aggregate_type,
            column: None,
            column_alias: None,
            time_column: None,
            price_column: None,
            volume_column: None,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.column_alias = Some(alias.into());
        self
    }
}

/// Refresh policy for a continuous aggregate or rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshPolicy {
    pub start_offset: String,
    pub end_offset: String,
    pub schedule_interval: String,
}

fn default_true() -> bool {
    true
}

/// Options for a continuous aggregate view over a hypertable.
///
/// The view name and source table are supplied separately when the
/// builder is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateContinuousAggregateOptions {
    /// Bucket width, e.g. `"1 hour"`
    pub bucket_interval: String,
    /// Time column of the source hypertable
    pub time_column: String,
    /// Aggregate columns, keyed by output alias. A `bucket` aggregate is
    /// synthesized from `time_column` when none is supplied.
    #[serde(default)]
    pub aggregates: BTreeMap<String, AggregateColumnOptions>,
    /// Extra columns projected as-is and added to the GROUP BY
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_policy: Option<RefreshPolicy>,
    #[serde(default = "default_true")]
    pub materialized_only: bool,
    #[serde(default = "default_true")]
    pub create_group_indexes: bool,
}

impl CreateContinuousAggregateOptions {
    pub fn new(bucket_interval: impl Into<String>, time_column: impl Into<String>) -> Self {
        CreateContinuousAggregateOptions {
            bucket_interval: bucket_interval.into(),
            time_column: time_column.into(),
            aggregates: BTreeMap::new(),
            group_columns: Vec::new(),
            refresh_policy: None,
            materialized_only: true,
            create_group_indexes: true,
        }
    }

    pub fn with_aggregate(mut self, alias: impl Into<String>, agg: AggregateColumnOptions) -> Self {
        self.aggregates.insert(alias.into(), agg);
        self
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = Some(policy);
        self
    }
}

/// The per-rule rollup accessor. Only `rollup()` exists today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupFunction {
    #[default]
    Rollup,
}

/// One column carried from a source aggregate into a rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupRule {
    pub source_column: String,
    /// Defaults to `source_column`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    /// When set to `sum`/`avg`, re-aggregate directly instead of calling
    /// the vendor `rollup()` accessor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_type: Option<AggregateType>,
    #[serde(default)]
    pub rollup_fn: RollupFunction,
}

/// Mapping from the source aggregate's bucket column to the rollup's own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketColumn {
    pub source: String,
    pub target: String,
}

/// Options specific to the rollup view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupOptions {
    /// Name of the rollup view
    pub name: String,
    /// Name of the continuous aggregate it reads from
    pub source_view: String,
    /// Coarser bucket width the rollup re-buckets at
    pub bucket_interval: String,
    pub rollup_rules: Vec<RollupRule>,
    pub bucket_column: BucketColumn,
    #[serde(default = "default_true")]
    pub materialized_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_policy: Option<RefreshPolicy>,
}

/// Full rollup configuration: the rollup shape plus the continuous
/// aggregate options it is layered on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    pub continuous_aggregate_options: CreateContinuousAggregateOptions,
    pub rollup_options: RollupOptions,
}

fn default_bucket_interval() -> String {
    "1 hour".to_string()
}

/// Options for candlestick (OHLCV) aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandlestickAggregateOptions {
    pub price_column: String,
    /// Defaults to the hypertable's partition column when driven through
    /// the repository helpers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_column: Option<String>,
    #[serde(default = "default_bucket_interval")]
    pub bucket_interval: String,
}

/// An inclusive time window for analytical queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Metric kinds supported by the time-bucket query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Count,
    DistinctCount,
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
}

impl std::str::FromStr for MetricType {
    type Err = crate::error::BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(MetricType::Count),
            "distinct_count" => Ok(MetricType::DistinctCount),
            "sum" => Ok(MetricType::Sum),
            "avg" => Ok(MetricType::Avg),
            "min" => Ok(MetricType::Min),
            "max" => Ok(MetricType::Max),
            "first" => Ok(MetricType::First),
            "last" => Ok(MetricType::Last),
            other => Err(crate::error::BuildError::UnsupportedMetricType(
                other.to_string(),
            )),
        }
    }
}

/// One metric column in a time-bucket query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Output alias; defaults to `metric_<index>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Configuration for a time-bucket query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucketConfig {
    /// Bucket width, e.g. `"1 hour"`
    pub interval: String,
    pub metrics: Vec<MetricConfig>,
}

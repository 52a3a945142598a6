//! Bucketed metric queries over a hypertable's time column.

use tracing::debug;

use crate::config::{MetricConfig, MetricType, TimeBucketConfig, TimeRange};
use crate::error::BuildError;
use crate::query::CompiledQuery;
use crate::sql::escape::escape_identifier;
use crate::sql::where_clause::{build_where_clause, WhereClause, WhereValue};

/// Builds a two-stage time-bucket query: an inner CTE that buckets and
/// aggregates, and an outer projection that renders each bucket as an
/// ISO-8601 UTC string.
#[derive(Debug, Clone)]
pub struct TimeBucketBuilder {
    table_name: String,
    time_column: String,
    config: TimeBucketConfig,
}

impl TimeBucketBuilder {
    pub fn new(
        table_name: impl Into<String>,
        time_column: impl Into<String>,
        config: TimeBucketConfig,
    ) -> Self {
        TimeBucketBuilder {
            table_name: table_name.into(),
            time_column: time_column.into(),
            config,
        }
    }

    fn metric_expression(
        &self,
        index: usize,
        metric: &MetricConfig,
    ) -> Result<(String, String), BuildError> {
        let alias = metric
            .alias
            .clone()
            .unwrap_or_else(|| format!("metric_{index}"));
        let escaped_alias = escape_identifier(&alias)?;

        let column = |kind: &'static str| -> Result<String, BuildError> {
            let name = metric
                .column
                .as_deref()
                .ok_or(BuildError::MissingColumn(kind))?;
            Ok(escape_identifier(name)?)
        };

        let expr = match metric.metric_type {
            MetricType::Count => match &metric.column {
                Some(name) => format!("COUNT({})", escape_identifier(name)?),
                None => "COUNT(*)".to_string(),
            },
            MetricType::DistinctCount => format!("COUNT(DISTINCT {})", column("distinct_count")?),
            MetricType::Sum => format!("SUM({})", column("sum")?),
            MetricType::Avg => format!("AVG({})", column("avg")?),
            MetricType::Min => format!("MIN({})", column("min")?),
            MetricType::Max => format!("MAX({})", column("max")?),
            MetricType::First => format!(
                "first({}, {})",
                column("first")?,
                escape_identifier(&self.time_column)?
            ),
            MetricType::Last => format!(
                "last({}, {})",
                column("last")?,
                escape_identifier(&self.time_column)?
            ),
        };

        Ok((format!("{expr} as {escaped_alias}"), escaped_alias))
    }

    /// Compiles the query. The time range is mandatory; without it the
    /// bucket scan would be unbounded.
    ///
    /// Parameters bind as `$1` interval, `$2`/`$3` range bounds, then any
    /// filter values.
    pub fn build(
        &self,
        range: Option<&TimeRange>,
        where_clause: Option<&WhereClause>,
    ) -> Result<CompiledQuery, BuildError> {
        let range = range.ok_or(BuildError::RangeRequired)?;
        let time_column = escape_identifier(&self.time_column)?;
        let table_name = escape_identifier(&self.table_name)?;

        let mut params: Vec<WhereValue> = vec![
            WhereValue::Text(self.config.interval.clone()),
            WhereValue::Timestamp(range.start),
            WhereValue::Timestamp(range.end),
        ];

        let mut inner_columns = vec![format!("time_bucket($1::interval, {time_column}) AS interval")];
        let mut outer_columns = vec![
            "TO_CHAR(interval, 'YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"') as interval".to_string(),
        ];

        for (index, metric) in self.config.metrics.iter().enumerate() {
            let (expression, alias) = self.metric_expression(index, metric)?;
            inner_columns.push(expression);
            outer_columns.push(format!("{alias} as {alias}"));
        }

        let mut predicates = vec![
            format!("{time_column} >= $2"),
            format!("{time_column} <= $3"),
        ];
        if let Some(where_clause) = where_clause {
            let compiled = build_where_clause(where_clause, params.len() + 1)?;
            if !compiled.is_empty() {
                predicates.push(compiled.sql);
                params.extend(compiled.params);
            }
        }

        let sql = format!(
            "WITH time_buckets AS (\n  SELECT\n    {}\n  FROM {table_name}\n  WHERE {}\n  GROUP BY interval\n  ORDER BY interval DESC\n)\nSELECT\n  {}\nFROM time_buckets;",
            inner_columns.join(",\n    "),
            predicates.join("\n    AND "),
            outer_columns.join(",\n  ")
        );

        debug!(table = %self.table_name, metrics = self.config.metrics.len(), "built time-bucket query");
        Ok(CompiledQuery { sql, params })
    }
}

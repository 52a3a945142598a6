//! OHLCV queries over the vendor `candlestick_agg` aggregate.

use tracing::debug;

use crate::config::{CandlestickAggregateOptions, TimeRange};
use crate::error::BuildError;
use crate::query::CompiledQuery;
use crate::sql::escape::escape_identifier;
use crate::sql::where_clause::{build_where_clause, WhereClause, WhereValue};

/// Builds candlestick (open/high/low/close, optionally volume and vwap)
/// queries against a raw hypertable.
#[derive(Debug, Clone)]
pub struct CandlestickQueryBuilder {
    table_name: String,
    options: CandlestickAggregateOptions,
}

impl CandlestickQueryBuilder {
    pub fn new(table_name: impl Into<String>, options: CandlestickAggregateOptions) -> Self {
        CandlestickQueryBuilder {
            table_name: table_name.into(),
            options,
        }
    }

    /// Fills in the time column when the caller resolves it from the
    /// hypertable instead of the options.
    pub fn with_time_column(mut self, time_column: impl Into<String>) -> Self {
        self.options.time_column = Some(time_column.into());
        self
    }

    /// Compiles the query. Parameters bind as `$1` bucket interval, then
    /// the range bounds when present, then any filter values.
    pub fn build(
        &self,
        range: Option<&TimeRange>,
        where_clause: Option<&WhereClause>,
    ) -> Result<CompiledQuery, BuildError> {
        let time_column = self
            .options
            .time_column
            .as_deref()
            .ok_or(BuildError::MissingCandlestickColumns)?;
        if self.options.price_column.is_empty() {
            return Err(BuildError::MissingCandlestickColumns);
        }

        let table_name = escape_identifier(&self.table_name)?;
        let time = escape_identifier(time_column)?;
        let price = escape_identifier(&self.options.price_column)?;

        let agg = match &self.options.volume_column {
            Some(volume) => format!(
                "candlestick_agg({time}, {price}, {})",
                escape_identifier(volume)?
            ),
            None => format!("candlestick_agg({time}, {price})"),
        };

        let mut columns = vec![format!(
            "time_bucket($1::interval, {time}) as bucket_time"
        )];
        for accessor in [
            "open",
            "high",
            "low",
            "close",
            "open_time",
            "high_time",
            "low_time",
            "close_time",
        ] {
            columns.push(format!("{accessor}({agg}) as {accessor}"));
        }
        if self.options.volume_column.is_some() {
            columns.push(format!("volume({agg}) as volume"));
            columns.push(format!("vwap({agg}) as vwap"));
        }

        let mut params: Vec<WhereValue> =
            vec![WhereValue::Text(self.options.bucket_interval.clone())];
        let mut predicates = Vec::new();

        if let Some(range) = range {
            params.push(WhereValue::Timestamp(range.start));
            params.push(WhereValue::Timestamp(range.end));
            predicates.push(format!("{time} >= $2"));
            predicates.push(format!("{time} <= $3"));
        }
        if let Some(where_clause) = where_clause {
            let compiled = build_where_clause(where_clause, params.len() + 1)?;
            if !compiled.is_empty() {
                predicates.push(compiled.sql);
                params.extend(compiled.params);
            }
        }

        let where_fragment = if predicates.is_empty() {
            String::new()
        } else {
            format!("\nWHERE {}", predicates.join("\n  AND "))
        };

        let sql = format!(
            "SELECT\n  {}\nFROM {table_name}{where_fragment}\nGROUP BY bucket_time\nORDER BY bucket_time ASC;",
            columns.join(",\n  ")
        );

        debug!(table = %self.table_name, "built candlestick query");
        Ok(CompiledQuery { sql, params })
    }
}

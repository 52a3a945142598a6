//! Continuous aggregate view statements.

use tracing::debug;

use crate::config::{
    AggregateColumnOptions, AggregateType, CreateContinuousAggregateOptions, RefreshPolicy,
};
use crate::error::{BuildError, ConfigError};
use crate::sql::escape::{escape_identifier, escape_literal};

/// Builder family for a continuous aggregate sourced from a hypertable.
#[derive(Debug, Clone)]
pub struct ContinuousAggregate {
    name: String,
    source: String,
    options: CreateContinuousAggregateOptions,
}

impl ContinuousAggregate {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        options: CreateContinuousAggregateOptions,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let source = source.into();

        if name.is_empty() {
            return Err(ConfigError::NameRequired);
        }
        if source.is_empty() {
            return Err(ConfigError::InvalidOptions(
                "continuous aggregate source cannot be empty".to_string(),
            ));
        }

        Ok(ContinuousAggregate {
            name,
            source,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The alias the bucket column is projected under.
    pub fn bucket_alias(&self) -> &str {
        self.options
            .aggregates
            .iter()
            .find(|(_, config)| config.aggregate_type == AggregateType::Bucket)
            .map(|(key, config)| config.column_alias.as_deref().unwrap_or(key))
            .unwrap_or("bucket")
    }

    fn generate_aggregate(
        &self,
        alias: &str,
        config: &AggregateColumnOptions,
    ) -> Result<String, BuildError> {
        let alias = escape_identifier(config.column_alias.as_deref().unwrap_or(alias))?;

        let require_column = |kind: &'static str| {
            config
                .column
                .as_deref()
                .ok_or(BuildError::MissingColumn(kind))
        };

        let expr = match config.aggregate_type {
            AggregateType::Count => format!("COUNT(*) as {alias}"),
            AggregateType::CountDistinct => {
                let column = escape_identifier(require_column("count_distinct")?)?;
                format!("COUNT(DISTINCT {column}) as {alias}")
            }
            AggregateType::Sum => {
                let column = escape_identifier(require_column("sum")?)?;
                format!("SUM({column}) as {alias}")
            }
            AggregateType::Avg => {
                let column = escape_identifier(require_column("avg")?)?;
                format!("AVG({column}) as {alias}")
            }
            AggregateType::Min => {
                let column = escape_identifier(require_column("min")?)?;
                format!("MIN({column}) as {alias}")
            }
            AggregateType::Max => {
                let column = escape_identifier(require_column("max")?)?;
                format!("MAX({column}) as {alias}")
            }
            AggregateType::Bucket => {
                let interval = escape_literal(&self.options.bucket_interval)?;
                let column = escape_identifier(require_column("bucket")?)?;
                format!("time_bucket({interval}, {column}) as {alias}")
            }
            AggregateType::Candlestick => {
                let (time_column, price_column) = match (&config.time_column, &config.price_column)
                {
                    (Some(t), Some(p)) => (t, p),
                    _ => return Err(BuildError::MissingCandlestickColumns),
                };
                let mut args = vec![
                    escape_identifier(time_column)?,
                    escape_identifier(price_column)?,
                ];
                if let Some(volume) = &config.volume_column {
                    args.push(escape_identifier(volume)?);
                }
                format!("candlestick_agg({}) as {alias}", args.join(", "))
            }
        };

        Ok(expr)
    }

    fn generate_select(&self) -> Result<String, BuildError> {
        let source = escape_identifier(&self.source)?;

        let mut projections: Vec<String> = Vec::new();
        let mut group_by: Vec<String> = Vec::new();

        let bucket_entry = self
            .options
            .aggregates
            .iter()
            .find(|(_, config)| config.aggregate_type == AggregateType::Bucket);

        match bucket_entry {
            Some((key, config)) => {
                projections.push(self.generate_aggregate(key, config)?);
                group_by.push(escape_identifier(
                    config.column_alias.as_deref().unwrap_or(key),
                )?);
            }
            None => {
                // Synthesize the bucket from the configured time column.
                let synthesized = AggregateColumnOptions::of_type(AggregateType::Bucket)
                    .with_column(self.options.time_column.clone());
                projections.push(self.generate_aggregate("bucket", &synthesized)?);
                group_by.push(escape_identifier("bucket")?);
            }
        }

        for column in &self.options.group_columns {
            let column = escape_identifier(column)?;
            projections.push(format!("{column} as {column}"));
            group_by.push(column);
        }

        for (alias, config) in &self.options.aggregates {
            if config.aggregate_type == AggregateType::Bucket {
                continue;
            }
            projections.push(self.generate_aggregate(alias, config)?);
        }

        Ok(format!(
            "SELECT\n  {}\nFROM {source}\nGROUP BY {}",
            projections.join(",\n  "),
            group_by.join(", ")
        ))
    }

    /// The `CREATE MATERIALIZED VIEW ... WITH NO DATA` statement.
    ///
    /// The refresh policy is intentionally not part of this statement: the
    /// engine refuses policy registration in the same statement as view
    /// creation, so callers issue [`Self::refresh_policy`] afterwards.
    pub fn up(&self) -> Result<String, BuildError> {
        let view_name = escape_identifier(&self.name)?;

        let with_clause = if self.options.materialized_only {
            "WITH (timescaledb.continuous)"
        } else {
            "WITH (timescaledb.continuous, timescaledb.materialized_only = false)"
        };

        let sql = format!(
            "CREATE MATERIALIZED VIEW {view_name}\n{with_clause} AS\n{}\nWITH NO DATA;",
            self.generate_select()?
        );
        debug!(view = %self.name, "built continuous aggregate up statement");
        Ok(sql)
    }

    /// The policy registration statement, or `None` when no refresh
    /// policy is configured. Issue after the view exists.
    pub fn refresh_policy(&self) -> Result<Option<String>, BuildError> {
        match &self.options.refresh_policy {
            None => Ok(None),
            Some(policy) => Ok(Some(refresh_policy_statement(&self.name, policy)?)),
        }
    }

    /// Teardown: remove the refresh policy when one is configured, then
    /// drop the view. Both steps use `if_exists` semantics.
    pub fn down(&self) -> Result<Vec<String>, BuildError> {
        let mut statements = Vec::new();

        if self.options.refresh_policy.is_some() {
            statements.push(format!(
                "SELECT remove_continuous_aggregate_policy({}, if_exists => true);",
                escape_literal(&self.name)?
            ));
        }

        statements.push(format!(
            "DROP MATERIALIZED VIEW IF EXISTS {};",
            escape_identifier(&self.name)?
        ));

        debug!(view = %self.name, statements = statements.len(), "built continuous aggregate down statements");
        Ok(statements)
    }

    /// Existence check against the continuous aggregate catalog, aliased
    /// `view_exists`.
    pub fn inspect(&self) -> Result<String, BuildError> {
        let literal_name = escape_literal(&self.name)?;

        Ok(format!(
            "SELECT EXISTS (\n  SELECT FROM timescaledb_information.continuous_aggregates\n  WHERE view_name = {literal_name}\n) as view_exists;"
        ))
    }
}

pub(crate) fn refresh_policy_statement(
    view_name: &str,
    policy: &RefreshPolicy,
) -> Result<String, BuildError> {
    Ok(format!(
        "SELECT add_continuous_aggregate_policy({},\n  start_offset => INTERVAL {},\n  end_offset => INTERVAL {},\n  schedule_interval => INTERVAL {}\n);",
        escape_literal(view_name)?,
        escape_literal(&policy.start_offset)?,
        escape_literal(&policy.end_offset)?,
        escape_literal(&policy.schedule_interval)?
    ))
}

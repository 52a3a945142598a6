//! Rollup view statements: a continuous aggregate layered over another
//! continuous aggregate's pre-aggregated buckets at a coarser interval.

use tracing::debug;

use crate::config::{AggregateType, RefreshPolicy, RollupConfig, RollupRule};
use crate::ddl::continuous_aggregate::{refresh_policy_statement, ContinuousAggregate};
use crate::error::BuildError;
use crate::sql::escape::{escape_identifier, escape_literal};

/// Builder family for a rollup view.
#[derive(Debug, Clone)]
pub struct Rollup {
    config: RollupConfig,
}

impl Rollup {
    /// Validates the nested option groups before any SQL can be built.
    pub fn new(config: RollupConfig) -> Result<Self, BuildError> {
        let rollup = &config.rollup_options;

        if rollup.name.is_empty() {
            return Err(BuildError::InvalidConfiguration(
                "rollup name cannot be empty".to_string(),
            ));
        }
        if rollup.source_view.is_empty() {
            return Err(BuildError::InvalidConfiguration(
                "rollup source view cannot be empty".to_string(),
            ));
        }
        if rollup.rollup_rules.is_empty() {
            return Err(BuildError::InvalidConfiguration(
                "at least one rollup rule is required".to_string(),
            ));
        }
        if rollup.bucket_column.source.is_empty() || rollup.bucket_column.target.is_empty() {
            return Err(BuildError::InvalidConfiguration(
                "bucket_column.source and bucket_column.target are required".to_string(),
            ));
        }

        Ok(Rollup { config })
    }

    /// Constructs from raw metadata, failing fast when a nested option
    /// group is absent entirely.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, BuildError> {
        if value.get("continuous_aggregate_options").is_none() {
            return Err(BuildError::InvalidConfiguration(
                "continuous_aggregate_options group is required".to_string(),
            ));
        }
        if value.get("rollup_options").is_none() {
            return Err(BuildError::InvalidConfiguration(
                "rollup_options group is required".to_string(),
            ));
        }
        let config: RollupConfig = serde_json::from_value(value.clone())
            .map_err(|e| BuildError::InvalidConfiguration(e.to_string()))?;
        Rollup::new(config)
    }

    pub fn name(&self) -> &str {
        &self.config.rollup_options.name
    }

    pub fn source_view(&self) -> &str {
        &self.config.rollup_options.source_view
    }

    /// Checks that this rollup's bucket column references the source
    /// aggregate's bucket column exactly. Must pass before `up` output is
    /// ever executed against the source.
    pub fn verify_source(&self, source: &ContinuousAggregate) -> Result<(), BuildError> {
        let expected = source.bucket_alias();
        let found = &self.config.rollup_options.bucket_column.source;
        if found != expected {
            return Err(BuildError::BucketColumnMismatch {
                expected: expected.to_string(),
                found: found.clone(),
            });
        }
        Ok(())
    }

    fn generate_rule(&self, rule: &RollupRule) -> Result<String, BuildError> {
        let source_column = escape_identifier(&rule.source_column)?;
        let target_column =
            escape_identifier(rule.target_column.as_deref().unwrap_or(&rule.source_column))?;

        let expr = match rule.aggregate_type {
            Some(AggregateType::Sum) => format!("sum({source_column}) as {target_column}"),
            Some(AggregateType::Avg) => format!("avg({source_column}) as {target_column}"),
            Some(other) => {
                return Err(BuildError::UnsupportedAggregate(format!("{other:?}")));
            }
            // No explicit aggregate: re-aggregate through the vendor
            // rollup() accessor over the pre-aggregated source column.
            None => format!("rollup({source_column}) as {target_column}"),
        };

        Ok(expr)
    }

    /// The `CREATE MATERIALIZED VIEW` statement re-bucketing the source
    /// aggregate at this rollup's own interval.
    pub fn up(&self) -> Result<String, BuildError> {
        let options = &self.config.rollup_options;

        let view_name = escape_identifier(&options.name)?;
        let source_view = escape_identifier(&options.source_view)?;
        let bucket_interval = escape_literal(&options.bucket_interval)?;
        let bucket_source = escape_identifier(&options.bucket_column.source)?;
        let bucket_target = escape_identifier(&options.bucket_column.target)?;

        let rules = options
            .rollup_rules
            .iter()
            .map(|rule| self.generate_rule(rule))
            .collect::<Result<Vec<_>, _>>()?;

        let with_clause = if options.materialized_only {
            "WITH (timescaledb.continuous)"
        } else {
            "WITH (timescaledb.continuous, timescaledb.materialized_only = false)"
        };

        let sql = format!(
            "CREATE MATERIALIZED VIEW {view_name}\n{with_clause} AS\nSELECT\n  time_bucket({bucket_interval}, {bucket_source}) AS {bucket_target},\n  {}\nFROM {source_view}\nGROUP BY 1\nWITH NO DATA;",
            rules.join(",\n  ")
        );
        debug!(view = %options.name, "built rollup up statement");
        Ok(sql)
    }

    fn configured_refresh_policy(&self) -> Option<&RefreshPolicy> {
        self.config
            .rollup_options
            .refresh_policy
            .as_ref()
            .or(self.config.continuous_aggregate_options.refresh_policy.as_ref())
    }

    /// The policy registration statement, issued after the view exists.
    pub fn refresh_policy(&self) -> Result<Option<String>, BuildError> {
        match self.configured_refresh_policy() {
            None => Ok(None),
            Some(policy) => Ok(Some(refresh_policy_statement(
                &self.config.rollup_options.name,
                policy,
            )?)),
        }
    }

    /// Teardown: remove the refresh policy when configured, then drop the
    /// view, both with `if_exists` semantics.
    pub fn down(&self) -> Result<Vec<String>, BuildError> {
        let name = &self.config.rollup_options.name;
        let mut statements = Vec::new();

        if self.configured_refresh_policy().is_some() {
            statements.push(format!(
                "SELECT remove_continuous_aggregate_policy({}, if_exists => true);",
                escape_literal(name)?
            ));
        }

        statements.push(format!(
            "DROP MATERIALIZED VIEW IF EXISTS {};",
            escape_identifier(name)?
        ));

        Ok(statements)
    }

    /// Existence checks for both the source view and the rollup view,
    /// aliased `source_view_exists` / `rollup_view_exists`.
    pub fn inspect(&self) -> Result<String, BuildError> {
        let source_view = escape_literal(&self.config.rollup_options.source_view)?;
        let rollup_view = escape_literal(&self.config.rollup_options.name)?;

        Ok(format!(
            "SELECT\n  EXISTS (\n    SELECT FROM information_schema.views\n    WHERE table_schema = 'public'\n    AND table_name = {source_view}\n  ) as source_view_exists,\n  EXISTS (\n    SELECT FROM information_schema.views\n    WHERE table_schema = 'public'\n    AND table_name = {rollup_view}\n  ) as rollup_view_exists;"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AggregateColumnOptions, BucketColumn, CreateContinuousAggregateOptions, RollupFunction,
        RollupOptions,
    };
    use pretty_assertions::assert_eq;

    fn rollup_config() -> RollupConfig {
        RollupConfig {
            continuous_aggregate_options: CreateContinuousAggregateOptions::new("1 hour", "time"),
            rollup_options: RollupOptions {
                name: "ohlcv_1d".to_string(),
                source_view: "ohlcv_1h".to_string(),
                bucket_interval: "1 day".to_string(),
                rollup_rules: vec![RollupRule {
                    source_column: "candlestick".to_string(),
                    target_column: None,
                    aggregate_type: None,
                    rollup_fn: RollupFunction::Rollup,
                }],
                bucket_column: BucketColumn {
                    source: "bucket".to_string(),
                    target: "bucket".to_string(),
                },
                materialized_only: true,
                refresh_policy: None,
            },
        }
    }

    #[test]
    fn builds_a_rollup_view() {
        let rollup = Rollup::new(rollup_config()).unwrap();
        assert_eq!(
            rollup.up().unwrap(),
            "CREATE MATERIALIZED VIEW \"ohlcv_1d\"\nWITH (timescaledb.continuous) AS\nSELECT\n  time_bucket('1 day', \"bucket\") AS \"bucket\",\n  rollup(\"candlestick\") as \"candlestick\"\nFROM \"ohlcv_1h\"\nGROUP BY 1\nWITH NO DATA;"
        );
    }

    #[test]
    fn materialized_only_false_is_emitted_in_the_with_clause() {
        let mut config = rollup_config();
        config.rollup_options.materialized_only = false;
        let rollup = Rollup::new(config).unwrap();
        let sql = rollup.up().unwrap();
        assert!(sql.contains(
            "WITH (timescaledb.continuous, timescaledb.materialized_only = false) AS"
        ));
    }

    #[test]
    fn explicit_aggregate_types_bypass_rollup_accessor() {
        let mut config = rollup_config();
        config.rollup_options.rollup_rules = vec![
            RollupRule {
                source_column: "total".to_string(),
                target_column: Some("total_sum".to_string()),
                aggregate_type: Some(AggregateType::Sum),
                rollup_fn: RollupFunction::Rollup,
            },
            RollupRule {
                source_column: "mean".to_string(),
                target_column: None,
                aggregate_type: Some(AggregateType::Avg),
                rollup_fn: RollupFunction::Rollup,
            },
        ];
        let rollup = Rollup::new(config).unwrap();
        let sql = rollup.up().unwrap();
        assert!(sql.contains("sum(\"total\") as \"total_sum\""));
        assert!(sql.contains("avg(\"mean\") as \"mean\""));
    }

    #[test]
    fn unsupported_rule_aggregate_fails() {
        let mut config = rollup_config();
        config.rollup_options.rollup_rules[0].aggregate_type = Some(AggregateType::Max);
        let rollup = Rollup::new(config).unwrap();
        assert!(matches!(
            rollup.up().unwrap_err(),
            BuildError::UnsupportedAggregate(_)
        ));
    }

    #[test]
    fn missing_nested_groups_fail_fast() {
        let err = Rollup::from_value(&serde_json::json!({
            "rollup_options": { "name": "x" }
        }))
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfiguration(_)));

        let err = Rollup::from_value(&serde_json::json!({
            "continuous_aggregate_options": { "bucket_interval": "1 hour", "time_column": "time" }
        }))
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfiguration(_)));
    }

    #[test]
    fn empty_rules_are_rejected() {
        let mut config = rollup_config();
        config.rollup_options.rollup_rules.clear();
        assert!(matches!(
            Rollup::new(config).unwrap_err(),
            BuildError::InvalidConfiguration(_)
        ));
    }

    #[test]
    fn bucket_column_mismatch_is_an_invariant_violation() {
        let mut config = rollup_config();
        config.rollup_options.bucket_column.source = "wrong_bucket".to_string();
        let rollup = Rollup::new(config).unwrap();

        let source = ContinuousAggregate::new(
            "ohlcv_1h",
            "ticks",
            CreateContinuousAggregateOptions::new("1 hour", "time").with_aggregate(
                "bucket",
                AggregateColumnOptions::of_type(AggregateType::Bucket).with_column("time"),
            ),
        )
        .unwrap();

        match rollup.verify_source(&source).unwrap_err() {
            BuildError::BucketColumnMismatch { expected, found } => {
                assert_eq!(expected, "bucket");
                assert_eq!(found, "wrong_bucket");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn matching_bucket_column_passes() {
        let rollup = Rollup::new(rollup_config()).unwrap();
        let source = ContinuousAggregate::new(
            "ohlcv_1h",
            "ticks",
            CreateContinuousAggregateOptions::new("1 hour", "time"),
        )
        .unwrap();
        assert!(rollup.verify_source(&source).is_ok());
    }

    #[test]
    fn inspect_checks_source_and_rollup_views() {
        let rollup = Rollup::new(rollup_config()).unwrap();
        let sql = rollup.inspect().unwrap();
        assert!(sql.contains("table_name = 'ohlcv_1h'"));
        assert!(sql.contains("table_name = 'ohlcv_1d'"));
        assert!(sql.contains("source_view_exists"));
        assert!(sql.contains("rollup_view_exists"));
    }

    #[test]
    fn down_drops_the_view() {
        let rollup = Rollup::new(rollup_config()).unwrap();
        assert_eq!(
            rollup.down().unwrap(),
            vec!["DROP MATERIALIZED VIEW IF EXISTS \"ohlcv_1d\";".to_string()]
        );
    }
}

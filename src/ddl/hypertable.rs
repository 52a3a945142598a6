//! Hypertable conversion, compression and inspection statements.

use tracing::debug;

use crate::config::{CompressionSelect, CreateHypertableOptions, TimeBucketConfig};
use crate::error::{BuildError, ConfigError};
use crate::query::time_bucket::TimeBucketBuilder;
use crate::sql::escape::{escape_identifier, escape_literal, validate_identifier};

const DEFAULT_CHUNK_TIME_INTERVAL: &str = "1 day";

/// Builder family for a single hypertable.
///
/// Construction validates the table name and options; the `up`/`down`/
/// `inspect` methods then compile statement text without further I/O.
#[derive(Debug, Clone)]
pub struct Hypertable {
    name: String,
    options: CreateHypertableOptions,
}

impl Hypertable {
    pub fn new(
        name: impl Into<String>,
        options: CreateHypertableOptions,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::NameRequired);
        }

        validate_identifier(&name, true).map_err(ConfigError::InvalidName)?;

        if options.by_range.column_name.is_empty() {
            return Err(ConfigError::InvalidOptions(
                "by_range.column_name cannot be empty".to_string(),
            ));
        }

        Ok(Hypertable { name, options })
    }

    /// Constructs a hypertable from raw metadata values, surfacing the
    /// full diagnostic range: missing name, missing options, malformed
    /// options, invalid name.
    pub fn from_value(
        name: Option<&str>,
        options: Option<&serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        let name = name.filter(|n| !n.is_empty()).ok_or(ConfigError::NameRequired)?;
        let options = options.ok_or(ConfigError::OptionsRequired)?;
        let options: CreateHypertableOptions = serde_json::from_value(options.clone())
            .map_err(|e| ConfigError::InvalidOptions(e.to_string()))?;
        Hypertable::new(name, options)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The range-partitioning (time) column.
    pub fn time_column(&self) -> &str {
        &self.options.by_range.column_name
    }

    /// Statements that convert the table and, when configured, enable
    /// compression. Conversion uses `if_not_exists` so an already-converted
    /// table is not an error.
    pub fn up(&self) -> Result<Vec<String>, BuildError> {
        let literal_name = escape_literal(&self.name)?;
        let table_name = escape_identifier(&self.name)?;

        let mut statements = vec![format!(
            "SELECT create_hypertable({literal_name}, by_range({}), if_not_exists => true);",
            escape_literal(&self.options.by_range.column_name)?
        )];

        if let Some(compression) = &self.options.compression {
            if compression.compress {
                let orderby = escape_identifier(&compression.compress_orderby)?;
                let segmentby = escape_identifier(&compression.compress_segmentby)?;

                statements.push(format!(
                    "ALTER TABLE {table_name} SET (\n  timescaledb.compress,\n  timescaledb.compress_orderby = {orderby},\n  timescaledb.compress_segmentby = {segmentby}\n);"
                ));

                if let Some(policy) = &compression.policy {
                    statements.push(format!(
                        "SELECT add_compression_policy({literal_name}, INTERVAL {}, if_not_exists => true);",
                        escape_literal(&policy.schedule_interval)?
                    ));
                }

                let chunk_interval = compression
                    .chunk_time_interval
                    .as_deref()
                    .unwrap_or(DEFAULT_CHUNK_TIME_INTERVAL);
                statements.push(format!(
                    "SELECT set_chunk_time_interval({literal_name}, INTERVAL {});",
                    escape_literal(chunk_interval)?
                ));
            }
        }

        debug!(table = %self.name, statements = statements.len(), "built hypertable up statements");
        Ok(statements)
    }

    /// Teardown statements: disable compression, remove the compression
    /// policy, then drop all chunks.
    ///
    /// Dropping chunks deletes every row stored in the hypertable. This is
    /// an uninstall, not a schema-only revert; callers own the decision to
    /// run it.
    pub fn down(&self) -> Result<Vec<String>, BuildError> {
        let literal_name = escape_literal(&self.name)?;
        let table_name = escape_identifier(&self.name)?;

        let mut statements = Vec::new();

        if let Some(compression) = &self.options.compression {
            if compression.compress {
                statements.push(format!(
                    "ALTER TABLE {table_name} SET (timescaledb.compress = false);"
                ));
            }
            if compression.policy.is_some() {
                statements.push(format!(
                    "SELECT remove_compression_policy({literal_name}, if_exists => true);"
                ));
            }
        }

        statements.push(format!(
            "SELECT drop_chunks({literal_name}, NOW()::timestamp without time zone);"
        ));

        debug!(table = %self.name, statements = statements.len(), "built hypertable down statements");
        Ok(statements)
    }

    /// A single query returning two booleans, `table_exists` and
    /// `is_hypertable`, so the orchestrator can distinguish "nothing to
    /// do", "needs setup" and "already set up".
    pub fn inspect(&self) -> Result<String, BuildError> {
        let literal_name = escape_literal(&self.name)?;

        Ok(format!(
            "SELECT\n  EXISTS (\n    SELECT FROM information_schema.tables\n    WHERE table_schema = 'public'\n    AND table_name = {literal_name}\n  ) AS table_exists,\n  EXISTS (\n    SELECT FROM timescaledb_information.hypertables\n    WHERE hypertable_name = {literal_name}\n  ) AS is_hypertable;"
        ))
    }

    /// Select over `hypertable_compression_stats`, projecting the columns
    /// named in `select` (everything when none are).
    pub fn compression_stats(&self, select: &CompressionSelect) -> Result<String, BuildError> {
        let literal_name = escape_literal(&self.name)?;

        let mut columns = Vec::new();
        if select.total_chunks {
            columns.push("COALESCE(total_chunks, 0)::integer as total_chunks".to_string());
        }
        if select.compressed_chunks {
            columns
                .push("COALESCE(number_compressed_chunks, 0)::integer as compressed_chunks".to_string());
        }

        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(",\n")
        };

        Ok(format!(
            "SELECT\n{projection}\nFROM hypertable_compression_stats({literal_name});"
        ))
    }

    /// A time-bucket query builder over this hypertable's time column.
    pub fn time_bucket(&self, config: TimeBucketConfig) -> TimeBucketBuilder {
        TimeBucketBuilder::new(&self.name, self.time_column(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ByRange, CompressionPolicy, CompressionSpec};
    use pretty_assertions::assert_eq;

    fn plain_options() -> CreateHypertableOptions {
        CreateHypertableOptions {
            by_range: ByRange {
                column_name: "time".to_string(),
            },
            compression: None,
        }
    }

    fn compressed_options() -> CreateHypertableOptions {
        CreateHypertableOptions {
            by_range: ByRange {
                column_name: "time".to_string(),
            },
            compression: Some(CompressionSpec {
                compress: true,
                compress_orderby: "time".to_string(),
                compress_segmentby: "symbol".to_string(),
                chunk_time_interval: None,
                policy: Some(CompressionPolicy {
                    schedule_interval: "7 days".to_string(),
                }),
            }),
        }
    }

    #[test]
    fn rejects_empty_name() {
        assert!(matches!(
            Hypertable::new("", plain_options()).unwrap_err(),
            ConfigError::NameRequired
        ));
    }

    #[test]
    fn rejects_invalid_table_name() {
        assert!(matches!(
            Hypertable::new("2invalid", plain_options()).unwrap_err(),
            ConfigError::InvalidName(_)
        ));
    }

    #[test]
    fn accepts_63_byte_name_rejects_64() {
        let ok = format!("t{}", "a".repeat(62));
        let too_long = format!("t{}", "a".repeat(63));
        assert!(Hypertable::new(ok, plain_options()).is_ok());
        assert!(matches!(
            Hypertable::new(too_long, plain_options()).unwrap_err(),
            ConfigError::InvalidName(_)
        ));
    }

    #[test]
    fn from_value_distinguishes_missing_parts() {
        assert!(matches!(
            Hypertable::from_value(None, None).unwrap_err(),
            ConfigError::NameRequired
        ));
        assert!(matches!(
            Hypertable::from_value(Some("metrics"), None).unwrap_err(),
            ConfigError::OptionsRequired
        ));
        let bad = serde_json::json!({ "by_range": 42 });
        assert!(matches!(
            Hypertable::from_value(Some("metrics"), Some(&bad)).unwrap_err(),
            ConfigError::InvalidOptions(_)
        ));
    }

    #[test]
    fn up_without_compression_is_a_single_statement() {
        let hypertable = Hypertable::new("metrics", plain_options()).unwrap();
        let statements = hypertable.up().unwrap();
        assert_eq!(
            statements,
            vec![
                "SELECT create_hypertable('metrics', by_range('time'), if_not_exists => true);"
                    .to_string()
            ]
        );
    }

    #[test]
    fn up_with_compression_policy() {
        let hypertable = Hypertable::new("metrics", compressed_options()).unwrap();
        let statements = hypertable.up().unwrap();
        assert_eq!(statements.len(), 4);
        assert_eq!(
            statements[0],
            "SELECT create_hypertable('metrics', by_range('time'), if_not_exists => true);"
        );
        assert_eq!(
            statements[1],
            "ALTER TABLE \"metrics\" SET (\n  timescaledb.compress,\n  timescaledb.compress_orderby = \"time\",\n  timescaledb.compress_segmentby = \"symbol\"\n);"
        );
        assert_eq!(
            statements[2],
            "SELECT add_compression_policy('metrics', INTERVAL '7 days', if_not_exists => true);"
        );
        assert_eq!(
            statements[3],
            "SELECT set_chunk_time_interval('metrics', INTERVAL '1 day');"
        );
    }

    #[test]
    fn down_reverts_compression_then_drops_chunks() {
        let hypertable = Hypertable::new("metrics", compressed_options()).unwrap();
        let statements = hypertable.down().unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE \"metrics\" SET (timescaledb.compress = false);".to_string(),
                "SELECT remove_compression_policy('metrics', if_exists => true);".to_string(),
                "SELECT drop_chunks('metrics', NOW()::timestamp without time zone);".to_string(),
            ]
        );
    }

    #[test]
    fn inspect_returns_both_existence_checks() {
        let hypertable = Hypertable::new("metrics", plain_options()).unwrap();
        let sql = hypertable.inspect().unwrap();
        assert!(sql.contains("table_exists"));
        assert!(sql.contains("is_hypertable"));
        assert!(sql.contains("table_name = 'metrics'"));
        assert!(sql.contains("hypertable_name = 'metrics'"));
    }

    #[test]
    fn compression_stats_projects_selected_columns() {
        let hypertable = Hypertable::new("metrics", compressed_options()).unwrap();
        let sql = hypertable
            .compression_stats(&CompressionSelect {
                total_chunks: true,
                compressed_chunks: true,
            })
            .unwrap();
        assert_eq!(
            sql,
            "SELECT\nCOALESCE(total_chunks, 0)::integer as total_chunks,\nCOALESCE(number_compressed_chunks, 0)::integer as compressed_chunks\nFROM hypertable_compression_stats('metrics');"
        );

        let all = hypertable
            .compression_stats(&CompressionSelect::default())
            .unwrap();
        assert!(all.contains("SELECT\n*"));
    }
}

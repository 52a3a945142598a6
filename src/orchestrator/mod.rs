//! Idempotent schema provisioning.
//!
//! The orchestrator walks the registered schema in dependency order,
//! inspecting before every step so re-running a migration issues no DDL
//! for objects that already exist. Objects whose source is not ready yet
//! (the host's own migrations may not have created the table) are skipped
//! with a diagnostic rather than failing the run; the next pass picks
//! them up.

pub mod registry;

pub use registry::{SchemaObject, SchemaRegistry, TimeColumnCheck};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ddl::{timestamptz_check, ContinuousAggregate, Extension, Hypertable, Rollup};
use crate::error::OrchestratorError;
use crate::executor::{QueryExecutor, Row};

/// Engine errors that mean "the work was already done" and are safe to
/// swallow during concurrent or repeated runs.
const BENIGN_UP_ERRORS: &[&str] = &["already exists", "already a hypertable"];
const BENIGN_DOWN_ERRORS: &[&str] = &["does not exist"];

/// Drives a [`SchemaRegistry`] against a live database through a
/// [`QueryExecutor`].
pub struct SchemaOrchestrator<E> {
    executor: E,
    registry: SchemaRegistry,
}

impl<E: QueryExecutor> SchemaOrchestrator<E> {
    pub fn new(executor: E, registry: SchemaRegistry) -> Self {
        SchemaOrchestrator { executor, registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Provisions everything the registry declares: extension, time-column
    /// coercions, then hypertables, continuous aggregates and rollups in
    /// dependency order. Safe to call repeatedly.
    pub async fn migrate(&self) -> Result<(), OrchestratorError> {
        let extension = Extension::new(self.registry.extension_options().cloned());
        self.run_statement(&extension.up()?, BENIGN_UP_ERRORS)
            .await?;

        for check in self.registry.time_columns() {
            let sql = timestamptz_check(&check.table, &check.column)?;
            self.executor.execute(&sql, &[]).await?;
        }

        for object in self.registry.resolve()? {
            match object {
                SchemaObject::Hypertable(hypertable) => self.ensure_hypertable(hypertable).await?,
                SchemaObject::ContinuousAggregate(aggregate) => {
                    self.ensure_aggregate(aggregate).await?
                }
                SchemaObject::Rollup(rollup) => self.ensure_rollup(rollup).await?,
            }
        }

        info!("schema migration complete");
        Ok(())
    }

    /// Tears down registered objects in reverse dependency order. Does not
    /// drop the extension; other schemas may still use it.
    pub async fn rollback(&self) -> Result<(), OrchestratorError> {
        let mut objects = self.registry.resolve()?;
        objects.reverse();

        for object in objects {
            match object {
                SchemaObject::Rollup(rollup) => {
                    let flags = self.fetch_flags(&rollup.inspect()?).await?;
                    if !read_flag(&flags, "rollup_view_exists")? {
                        debug!(rollup = rollup.name(), "rollup view absent, nothing to drop");
                        continue;
                    }
                    for sql in rollup.down()? {
                        self.run_statement(&sql, BENIGN_DOWN_ERRORS).await?;
                    }
                }
                SchemaObject::ContinuousAggregate(aggregate) => {
                    let flags = self.fetch_flags(&aggregate.inspect()?).await?;
                    if !read_flag(&flags, "view_exists")? {
                        debug!(view = aggregate.name(), "aggregate view absent, nothing to drop");
                        continue;
                    }
                    for sql in aggregate.down()? {
                        self.run_statement(&sql, BENIGN_DOWN_ERRORS).await?;
                    }
                }
                SchemaObject::Hypertable(hypertable) => {
                    let flags = self.fetch_flags(&hypertable.inspect()?).await?;
                    if !read_flag(&flags, "is_hypertable")? {
                        debug!(table = hypertable.name(), "not a hypertable, nothing to revert");
                        continue;
                    }
                    for sql in hypertable.down()? {
                        self.run_statement(&sql, BENIGN_DOWN_ERRORS).await?;
                    }
                }
            }
        }

        info!("schema rollback complete");
        Ok(())
    }

    /// Reconciles the database with the registry: optionally tears down
    /// first, then migrates.
    pub async fn sync(&self, drop_before_sync: bool) -> Result<(), OrchestratorError> {
        if drop_before_sync {
            self.rollback().await?;
        }
        self.migrate().await
    }

    async fn ensure_hypertable(&self, hypertable: &Hypertable) -> Result<(), OrchestratorError> {
        let flags = self.fetch_flags(&hypertable.inspect()?).await?;

        if !read_flag(&flags, "table_exists")? {
            warn!(
                table = hypertable.name(),
                "table does not exist yet, skipping hypertable setup"
            );
            return Ok(());
        }
        if read_flag(&flags, "is_hypertable")? {
            debug!(table = hypertable.name(), "already a hypertable");
            return Ok(());
        }

        info!(table = hypertable.name(), "converting to hypertable");
        for sql in hypertable.up()? {
            self.run_statement(&sql, BENIGN_UP_ERRORS).await?;
        }
        Ok(())
    }

    async fn ensure_aggregate(
        &self,
        aggregate: &ContinuousAggregate,
    ) -> Result<(), OrchestratorError> {
        if let Some(source) = self.registry.hypertable(aggregate.source()) {
            let source_flags = self.fetch_flags(&source.inspect()?).await?;
            if !read_flag(&source_flags, "is_hypertable")? {
                warn!(
                    view = aggregate.name(),
                    source = aggregate.source(),
                    "source is not a hypertable yet, skipping continuous aggregate"
                );
                return Ok(());
            }
        }

        let flags = self.fetch_flags(&aggregate.inspect()?).await?;
        if read_flag(&flags, "view_exists")? {
            debug!(view = aggregate.name(), "continuous aggregate already exists");
            return Ok(());
        }

        info!(view = aggregate.name(), "creating continuous aggregate");
        self.run_statement(&aggregate.up()?, BENIGN_UP_ERRORS)
            .await?;
        if let Some(policy) = aggregate.refresh_policy()? {
            self.run_statement(&policy, BENIGN_UP_ERRORS).await?;
        }
        Ok(())
    }

    async fn ensure_rollup(&self, rollup: &Rollup) -> Result<(), OrchestratorError> {
        let flags = self.fetch_flags(&rollup.inspect()?).await?;

        if !read_flag(&flags, "source_view_exists")? {
            warn!(
                rollup = rollup.name(),
                source = rollup.source_view(),
                "source view does not exist yet, skipping rollup"
            );
            return Ok(());
        }
        if read_flag(&flags, "rollup_view_exists")? {
            debug!(rollup = rollup.name(), "rollup already exists");
            return Ok(());
        }

        info!(rollup = rollup.name(), "creating rollup");
        self.run_statement(&rollup.up()?, BENIGN_UP_ERRORS).await?;
        if let Some(policy) = rollup.refresh_policy()? {
            self.run_statement(&policy, BENIGN_UP_ERRORS).await?;
        }
        Ok(())
    }

    async fn run_statement(&self, sql: &str, benign: &[&str]) -> Result<(), OrchestratorError> {
        match self.executor.execute(sql, &[]).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let text = err.to_string();
                if benign.iter().any(|marker| text.contains(marker)) {
                    debug!(error = %text, "ignoring benign engine error");
                    Ok(())
                } else {
                    Err(OrchestratorError::Execution(err))
                }
            }
        }
    }

    async fn fetch_flags(&self, sql: &str) -> Result<Row, OrchestratorError> {
        let rows = self.executor.execute(sql, &[]).await?;
        rows.into_iter().next().ok_or_else(|| {
            OrchestratorError::Decode("inspection query returned no rows".to_string())
        })
    }
}

fn read_flag(row: &Row, key: &str) -> Result<bool, OrchestratorError> {
    row.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| OrchestratorError::Decode(format!("missing boolean column '{key}'")))
}

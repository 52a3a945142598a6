//! Declared-schema registry and dependency resolution.

use std::collections::HashMap;

use crate::config::CreateExtensionOptions;
use crate::ddl::{ContinuousAggregate, Hypertable, Rollup};
use crate::error::BuildError;

/// A table column to coerce to `timestamptz` before any conversion runs.
#[derive(Debug, Clone)]
pub struct TimeColumnCheck {
    pub table: String,
    pub column: String,
}

/// One registered schema object, in resolution order.
#[derive(Debug, Clone, Copy)]
pub enum SchemaObject<'a> {
    Hypertable(&'a Hypertable),
    ContinuousAggregate(&'a ContinuousAggregate),
    Rollup(&'a Rollup),
}

impl SchemaObject<'_> {
    pub fn name(&self) -> &str {
        match self {
            SchemaObject::Hypertable(h) => h.name(),
            SchemaObject::ContinuousAggregate(c) => c.name(),
            SchemaObject::Rollup(r) => r.name(),
        }
    }
}

/// Everything a host declares about its schema: the extension, time-column
/// normalizations, and the hypertable/aggregate/rollup objects.
///
/// Registration is order-independent; [`SchemaRegistry::resolve`] orders
/// objects so every source is provisioned before its dependents.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    extension: Option<CreateExtensionOptions>,
    time_columns: Vec<TimeColumnCheck>,
    hypertables: Vec<Hypertable>,
    aggregates: Vec<ContinuousAggregate>,
    rollups: Vec<Rollup>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    pub fn set_extension(&mut self, options: CreateExtensionOptions) -> &mut Self {
        self.extension = Some(options);
        self
    }

    pub fn extension_options(&self) -> Option<&CreateExtensionOptions> {
        self.extension.as_ref()
    }

    /// Registers a `timestamptz` coercion for `table.column`.
    pub fn normalize_time_column(
        &mut self,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> &mut Self {
        self.time_columns.push(TimeColumnCheck {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    pub fn time_columns(&self) -> &[TimeColumnCheck] {
        &self.time_columns
    }

    pub fn add_hypertable(&mut self, hypertable: Hypertable) -> &mut Self {
        self.hypertables.push(hypertable);
        self
    }

    pub fn add_continuous_aggregate(&mut self, aggregate: ContinuousAggregate) -> &mut Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn add_rollup(&mut self, rollup: Rollup) -> &mut Self {
        self.rollups.push(rollup);
        self
    }

    pub fn hypertable(&self, name: &str) -> Option<&Hypertable> {
        self.hypertables.iter().find(|h| h.name() == name)
    }

    pub fn aggregate(&self, name: &str) -> Option<&ContinuousAggregate> {
        self.aggregates.iter().find(|a| a.name() == name)
    }

    /// Validates cross-object invariants and returns every registered
    /// object in dependency order (sources before dependents).
    pub fn resolve(&self) -> Result<Vec<SchemaObject<'_>>, BuildError> {
        let nodes: Vec<SchemaObject<'_>> = self
            .hypertables
            .iter()
            .map(SchemaObject::Hypertable)
            .chain(self.aggregates.iter().map(SchemaObject::ContinuousAggregate))
            .chain(self.rollups.iter().map(SchemaObject::Rollup))
            .collect();

        let mut index_by_name: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            if index_by_name.insert(node.name(), index).is_some() {
                return Err(BuildError::InvalidConfiguration(format!(
                    "duplicate schema object name '{}'",
                    node.name()
                )));
            }
        }

        for rollup in &self.rollups {
            if self.rollups.iter().any(|r| r.name() == rollup.source_view()) {
                return Err(BuildError::MultiLevelRollup {
                    rollup: rollup.name().to_string(),
                    source: rollup.source_view().to_string(),
                });
            }
            if let Some(source) = self.aggregate(rollup.source_view()) {
                rollup.verify_source(source)?;
            }
        }

        // Edges point from each object to the registered object it reads
        // from; unregistered sources are assumed to exist already.
        let mut dependencies: Vec<Option<usize>> = vec![None; nodes.len()];
        for (index, node) in nodes.iter().enumerate() {
            let source = match node {
                SchemaObject::Hypertable(_) => None,
                SchemaObject::ContinuousAggregate(c) => Some(c.source()),
                SchemaObject::Rollup(r) => Some(r.source_view()),
            };
            dependencies[index] = source.and_then(|name| index_by_name.get(name).copied());
        }

        let mut ordered = Vec::with_capacity(nodes.len());
        let mut emitted = vec![false; nodes.len()];
        while ordered.len() < nodes.len() {
            let mut progressed = false;
            for index in 0..nodes.len() {
                if emitted[index] {
                    continue;
                }
                let ready = dependencies[index].map_or(true, |dep| emitted[dep]);
                if ready {
                    emitted[index] = true;
                    ordered.push(nodes[index]);
                    progressed = true;
                }
            }
            if !progressed {
                return Err(BuildError::InvalidConfiguration(
                    "schema objects form a dependency cycle".to_string(),
                ));
            }
        }

        Ok(ordered)
    }
}

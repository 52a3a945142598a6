//! Declarative schema compiler for TimescaleDB.
//!
//! Hypertables, continuous aggregates and rollups are described as plain
//! configuration values; the builders in [`ddl`] compile them into DDL
//! statement text, the [`orchestrator`] provisions them idempotently
//! through a [`executor::QueryExecutor`], and the builders in [`query`]
//! plus the [`repository`] helpers cover the analytical read side.
//!
//! SQL is always assembled through the escaping layer in [`sql`]:
//! identifiers are validated and quoted, values are bound as positional
//! parameters, and nothing caller-supplied is ever interpolated raw.

pub mod config;
pub mod ddl;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod query;
pub mod repository;
pub mod sql;

pub use config::{
    CandlestickAggregateOptions, CreateContinuousAggregateOptions, CreateExtensionOptions,
    CreateHypertableOptions, RollupConfig, TimeBucketConfig, TimeRange,
};
pub use ddl::{ContinuousAggregate, Extension, Hypertable, Rollup};
pub use error::{BuildError, ConfigError, EscapeError, ExecuteError, OrchestratorError};
pub use executor::{PgExecutor, QueryExecutor, Row};
pub use orchestrator::{SchemaOrchestrator, SchemaRegistry};
pub use repository::HypertableRepository;

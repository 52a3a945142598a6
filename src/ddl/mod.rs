//! DDL statement builders, one family per schema object kind.
//!
//! Builders compile validated configuration into statement text; nothing
//! here executes SQL. Each kind exposes `up` (create), `down` (drop or
//! revert) and, where the orchestrator needs an idempotency gate,
//! `inspect` (existence check) generators.

pub mod continuous_aggregate;
pub mod extension;
pub mod hypertable;
pub mod rollup;
pub mod time_column;

pub use continuous_aggregate::ContinuousAggregate;
pub use extension::Extension;
pub use hypertable::Hypertable;
pub use rollup::Rollup;
pub use time_column::timestamptz_check;

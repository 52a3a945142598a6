//! Execution seam between the compilers and a live database.
//!
//! The orchestrator and repository only ever talk to [`QueryExecutor`], so
//! hosts can hand in a pooled connection, a transaction wrapper, or a test
//! double. [`PgExecutor`] is the stock sqlx-backed implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row as _, TypeInfo};
use tracing::trace;

use crate::error::ExecuteError;
use crate::sql::where_clause::WhereValue;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Executes a statement with positional parameters and returns its rows.
///
/// DDL statements return an empty row set; inspection and analytical
/// queries return their projections as JSON-typed rows.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[WhereValue]) -> Result<Vec<Row>, ExecuteError>;
}

/// sqlx-backed executor over a connection pool.
#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        PgExecutor { pool }
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(&self, sql: &str, params: &[WhereValue]) -> Result<Vec<Row>, ExecuteError> {
        trace!(sql, params = params.len(), "executing statement");

        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                WhereValue::Bool(v) => query.bind(*v),
                WhereValue::Int(v) => query.bind(*v),
                WhereValue::Float(v) => query.bind(*v),
                WhereValue::Timestamp(v) => query.bind(*v),
                WhereValue::Text(v) => query.bind(v.clone()),
                WhereValue::List(_) => {
                    // List values are expanded into scalar placeholders by
                    // the condition compiler before they reach an executor.
                    return Err(ExecuteError::message(
                        "list parameter was not expanded before binding",
                    ));
                }
            };
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;

        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &PgRow) -> Row {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(index)
                .ok()
                .flatten()
                .map(Value::Bool),
            "INT2" => row
                .try_get::<Option<i16>, _>(index)
                .ok()
                .flatten()
                .map(|v| Value::from(v)),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)
                .ok()
                .flatten()
                .map(Value::from),
            "INT8" => row
                .try_get::<Option<i64>, _>(index)
                .ok()
                .flatten()
                .map(Value::from),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(index)
                .ok()
                .flatten()
                .map(|v| Value::from(f64::from(v))),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(index)
                .ok()
                .flatten()
                .map(Value::from),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(index)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(index)
                .ok()
                .flatten()
                .map(|v| Value::String(v.and_utc().to_rfc3339())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index).ok().flatten(),
            // Everything else (TEXT, VARCHAR, NUMERIC casts, aggregate
            // state renderings) comes back as its text form.
            _ => row
                .try_get::<Option<String>, _>(index)
                .ok()
                .flatten()
                .map(Value::String),
        };
        map.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    map
}

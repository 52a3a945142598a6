//! Time-column type normalization.
//!
//! Hypertable partition columns must be `timestamptz`; hosts whose table
//! definitions used a naive timestamp get converted in place. The DO-block
//! only alters the column when its current type differs, so the statement
//! is safe to re-run.

use crate::error::BuildError;
use crate::sql::escape::escape_literal;

/// Statement converting `table.column` to `timestamptz` when it is not
/// one already.
pub fn timestamptz_check(table_name: &str, column_name: &str) -> Result<String, BuildError> {
    let table_literal = escape_literal(table_name)?;
    let column_literal = escape_literal(column_name)?;

    Ok(format!(
        "DO $$\nBEGIN\n  IF EXISTS (\n    SELECT 1\n    FROM information_schema.columns\n    WHERE table_name = {table_literal}\n    AND column_name = {column_literal}\n    AND data_type != 'timestamp with time zone'\n  ) THEN\n    EXECUTE format('ALTER TABLE %I ALTER COLUMN %I TYPE timestamptz',\n      {table_literal},\n      {column_literal}\n    );\n  END IF;\nEND $$;"
    ))
}

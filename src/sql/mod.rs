pub mod escape;
pub mod where_clause;

pub use escape::{escape_identifier, escape_literal, validate_identifier};
pub use where_clause::{
    build_where_clause, CompiledWhere, WhereClause, WhereCondition, WhereOperator, WhereValue,
};

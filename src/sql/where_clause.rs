//! Condition compiler: structured filter maps to parameterized SQL.
//!
//! Filter values are always bound as positional parameters, never
//! interpolated; only column names pass through the escaping layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::sql::escape::escape_identifier;

/// A filter value bound as a query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhereValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
    List(Vec<WhereValue>),
}

impl From<&str> for WhereValue {
    fn from(v: &str) -> Self {
        WhereValue::Text(v.to_string())
    }
}

impl From<String> for WhereValue {
    fn from(v: String) -> Self {
        WhereValue::Text(v)
    }
}

impl From<i64> for WhereValue {
    fn from(v: i64) -> Self {
        WhereValue::Int(v)
    }
}

impl From<f64> for WhereValue {
    fn from(v: f64) -> Self {
        WhereValue::Float(v)
    }
}

impl From<DateTime<Utc>> for WhereValue {
    fn from(v: DateTime<Utc>) -> Self {
        WhereValue::Timestamp(v)
    }
}

/// Comparison operators accepted in a filter map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WhereOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
}

impl WhereOperator {
    fn as_sql(self) -> &'static str {
        match self {
            WhereOperator::Eq => "=",
            WhereOperator::Gt => ">",
            WhereOperator::Lt => "<",
            WhereOperator::Gte => ">=",
            WhereOperator::Lte => "<=",
            WhereOperator::In => "IN",
            WhereOperator::NotIn => "NOT IN",
        }
    }

    fn expects_list(self) -> bool {
        matches!(self, WhereOperator::In | WhereOperator::NotIn)
    }
}

/// One entry in a filter map: either a bare value (equality) or a set of
/// operator conditions applied to the same column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhereCondition {
    Operators(BTreeMap<WhereOperator, WhereValue>),
    Value(WhereValue),
}

/// A structured filter over columns.
///
/// Backed by a `BTreeMap`, so compilation iterates columns in lexicographic
/// order and the generated SQL text is deterministic for a given clause.
pub type WhereClause = BTreeMap<String, WhereCondition>;

/// A compiled filter: SQL fragment plus the parameters it binds, in
/// placeholder order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledWhere {
    pub sql: String,
    pub params: Vec<WhereValue>,
}

impl CompiledWhere {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Compiles a filter map into an `AND`-joined boolean expression with
/// positional placeholders starting at `start_param_index`.
///
/// An empty clause compiles to an empty fragment; callers must omit the
/// `WHERE` keyword entirely in that case.
pub fn build_where_clause(
    where_clause: &WhereClause,
    start_param_index: usize,
) -> Result<CompiledWhere, BuildError> {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<WhereValue> = Vec::new();
    let mut param_index = start_param_index;

    for (column, condition) in where_clause {
        let escaped_column = escape_identifier(column)?;

        match condition {
            WhereCondition::Value(value) => {
                if matches!(value, WhereValue::List(_)) {
                    return Err(BuildError::InvalidConfiguration(format!(
                        "bare list value for column '{column}' (use the IN operator)"
                    )));
                }
                conditions.push(format!("{escaped_column} = ${param_index}"));
                params.push(value.clone());
                param_index += 1;
            }
            WhereCondition::Operators(operators) => {
                for (operator, value) in operators {
                    match (operator.expects_list(), value) {
                        (true, WhereValue::List(items)) => {
                            let placeholders: Vec<String> = items
                                .iter()
                                .map(|_| {
                                    let p = format!("${param_index}");
                                    param_index += 1;
                                    p
                                })
                                .collect();
                            conditions.push(format!(
                                "{escaped_column} {} ({})",
                                operator.as_sql(),
                                placeholders.join(", ")
                            ));
                            params.extend(items.iter().cloned());
                        }
                        (true, _) => {
                            return Err(BuildError::InvalidConfiguration(format!(
                                "{} requires a list value for column '{column}'",
                                operator.as_sql()
                            )));
                        }
                        (false, WhereValue::List(_)) => {
                            return Err(BuildError::InvalidConfiguration(format!(
                                "{} does not accept a list value for column '{column}'",
                                operator.as_sql()
                            )));
                        }
                        (false, _) => {
                            conditions.push(format!(
                                "{escaped_column} {} ${param_index}",
                                operator.as_sql()
                            ));
                            params.push(value.clone());
                            param_index += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(CompiledWhere {
        sql: conditions.join(" AND "),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clause(entries: Vec<(&str, WhereCondition)>) -> WhereClause {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn empty_clause_compiles_to_nothing() {
        let compiled = build_where_clause(&WhereClause::new(), 1).unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn bare_value_means_equality() {
        let where_clause = clause(vec![("symbol", WhereCondition::Value("BTCUSDT".into()))]);
        let compiled = build_where_clause(&where_clause, 1).unwrap();
        assert_eq!(compiled.sql, "\"symbol\" = $1");
        assert_eq!(compiled.params, vec![WhereValue::Text("BTCUSDT".into())]);
    }

    #[test]
    fn columns_compile_in_lexicographic_order() {
        let where_clause = clause(vec![
            ("zeta", WhereCondition::Value(1i64.into())),
            ("alpha", WhereCondition::Value(2i64.into())),
        ]);
        let compiled = build_where_clause(&where_clause, 1).unwrap();
        assert_eq!(compiled.sql, "\"alpha\" = $1 AND \"zeta\" = $2");
        assert_eq!(
            compiled.params,
            vec![WhereValue::Int(2), WhereValue::Int(1)]
        );
    }

    #[test]
    fn operator_conditions_share_a_column() {
        let mut ops = BTreeMap::new();
        ops.insert(WhereOperator::Gte, WhereValue::Int(10));
        ops.insert(WhereOperator::Lt, WhereValue::Int(20));
        let where_clause = clause(vec![("price", WhereCondition::Operators(ops))]);
        let compiled = build_where_clause(&where_clause, 1).unwrap();
        assert_eq!(compiled.sql, "\"price\" < $1 AND \"price\" >= $2");
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn in_expands_one_placeholder_per_element() {
        let mut ops = BTreeMap::new();
        ops.insert(
            WhereOperator::In,
            WhereValue::List(vec!["a".into(), "b".into(), "c".into()]),
        );
        let where_clause = clause(vec![("symbol", WhereCondition::Operators(ops))]);
        let compiled = build_where_clause(&where_clause, 4).unwrap();
        assert_eq!(compiled.sql, "\"symbol\" IN ($4, $5, $6)");
        assert_eq!(compiled.params.len(), 3);
    }

    #[test]
    fn not_in_preserves_element_order() {
        let mut ops = BTreeMap::new();
        ops.insert(
            WhereOperator::NotIn,
            WhereValue::List(vec![WhereValue::Int(3), WhereValue::Int(1)]),
        );
        let where_clause = clause(vec![("id", WhereCondition::Operators(ops))]);
        let compiled = build_where_clause(&where_clause, 1).unwrap();
        assert_eq!(compiled.sql, "\"id\" NOT IN ($1, $2)");
        assert_eq!(
            compiled.params,
            vec![WhereValue::Int(3), WhereValue::Int(1)]
        );
    }

    #[test]
    fn in_with_scalar_value_is_rejected() {
        let mut ops = BTreeMap::new();
        ops.insert(WhereOperator::In, WhereValue::Int(3));
        let where_clause = clause(vec![("id", WhereCondition::Operators(ops))]);
        assert!(matches!(
            build_where_clause(&where_clause, 1).unwrap_err(),
            BuildError::InvalidConfiguration(_)
        ));
    }

    #[test]
    fn param_count_matches_placeholder_count() {
        let mut ops = BTreeMap::new();
        ops.insert(
            WhereOperator::In,
            WhereValue::List(vec![1i64.into(), 2i64.into()]),
        );
        ops.insert(WhereOperator::Gt, WhereValue::Int(0));
        let where_clause = clause(vec![
            ("id", WhereCondition::Operators(ops)),
            ("symbol", WhereCondition::Value("ETHUSDT".into())),
        ]);
        let compiled = build_where_clause(&where_clause, 1).unwrap();
        let placeholders = compiled.sql.matches('$').count();
        assert_eq!(placeholders, compiled.params.len());
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{ "symbol": "BTCUSDT", "price": { ">=": 100, "<": 200 } }"#;
        let where_clause: WhereClause = serde_json::from_str(json).unwrap();
        let compiled = build_where_clause(&where_clause, 1).unwrap();
        assert_eq!(
            compiled.sql,
            "\"price\" < $1 AND \"price\" >= $2 AND \"symbol\" = $3"
        );
    }
}

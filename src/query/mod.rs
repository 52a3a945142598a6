//! Parameterized analytical query builders.
//!
//! These compose the condition compiler and positional parameter binding
//! into read queries; like the DDL builders they are pure and never touch
//! a connection.

pub mod candlestick;
pub mod parse;
pub mod time_bucket;

pub use candlestick::CandlestickQueryBuilder;
pub use parse::{parse_candlestick, Candlestick};
pub use time_bucket::TimeBucketBuilder;

use crate::sql::where_clause::WhereValue;

/// A compiled query: SQL text plus bound parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<WhereValue>,
}

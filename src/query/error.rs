//! Query parse errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query is empty")]
    Empty,

    #[error("unbalanced parenthesis at position {position}")]
    UnbalancedParens { position: usize },

    #[error("operator {operator} at position {position} has no operand")]
    DanglingOperator { operator: &'static str, position: usize },

    #[error("unterminated quote starting at position {position}")]
    UnterminatedQuote { position: usize },

    #[error("empty field name at position {position}")]
    EmptyField { position: usize },

    #[error("field {field} has no value")]
    EmptyValue { field: String },

    #[error("invalid time value {0:?}")]
    InvalidTime(String),

    #[error("invalid level {0:?}")]
    InvalidLevel(String),

    #[error("field {field} expects a number, got {value:?}")]
    InvalidNumber { field: String, value: String },

    #[error("field {field} does not support comparisons")]
    NotComparable { field: String },
}

//! Typed values bound to `$n` placeholders.

use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl BindValue {
    pub fn bind<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            BindValue::Int(n) => query.bind(*n),
            BindValue::Float(n) => query.bind(*n),
            BindValue::Text(s) => query.bind(s.clone()),
        }
    }
}

/// SQL literal form, for logs only. Statements never carry values as text.
impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::Int(n) => write!(f, "{}", n),
            BindValue::Float(n) => write!(f, "{}", n),
            BindValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

//! Fills `${COLUMNS}` / `${WHERE}` in a report's SQL template and appends ORDER BY / LIMIT.
//! Templates and column lists come from route definitions; request values only ever travel as `$n` parameters.

use crate::error::TemplateError;
use crate::sql::constraint::Constraint;
use crate::sql::params::BindValue;
use std::fmt;

pub const COLUMNS_PLACEHOLDER: &str = "${COLUMNS}";
pub const WHERE_PLACEHOLDER: &str = "${WHERE}";

/// Final SQL plus the values for its `$1..$n` placeholders.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Statement {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// SQL with the bound values written in as literals. Log output only.
impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sql = self.sql.clone();
        // Highest index first so `$1` never eats the prefix of `$10`.
        for (i, value) in self.params.iter().enumerate().rev() {
            sql = sql.replace(&format!("${}", i + 1), &value.to_string());
        }
        f.write_str(&sql)
    }
}

/// Render constraints as `WHERE a AND b ...`, numbering bound values from `$1`.
/// Text values compare against the column's text form, so string parameters
/// work on DATE, INT or NUMERIC columns as a quoted literal would.
fn where_clause(constraints: &[Constraint], params: &mut Vec<BindValue>) -> String {
    if constraints.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = constraints
        .iter()
        .map(|c| match c {
            Constraint::Bound { column, value } => {
                params.push(value.clone());
                match value {
                    BindValue::Text(_) => format!("{}::text=${}", column, params.len()),
                    BindValue::Int(_) | BindValue::Float(_) => format!("{}=${}", column, params.len()),
                }
            }
            Constraint::Raw(fragment) => fragment.clone(),
        })
        .collect();
    format!("WHERE {}", parts.join(" AND "))
}

/// Limit must be the canonical text of a non-negative integer ("10", not "010" or "1.0").
fn parse_limit(limit: &str) -> Result<u64, TemplateError> {
    match limit.parse::<u64>() {
        Ok(n) if n.to_string() == limit => Ok(n),
        _ => Err(TemplateError::InvalidLimit(limit.to_string())),
    }
}

/// Assemble a statement from a template.
///
/// A placeholder and its input must come together: `${COLUMNS}` needs a non-empty column
/// list, `${WHERE}` needs a constraint list (an empty list renders nothing). Input without
/// a placeholder to receive it is rejected as well.
pub fn assemble(
    template: &str,
    columns: Option<&[String]>,
    constraints: Option<&[Constraint]>,
    order_by: Option<&str>,
    limit: Option<&str>,
) -> Result<Statement, TemplateError> {
    let has_columns = template.contains(COLUMNS_PLACEHOLDER);
    let has_where = template.contains(WHERE_PLACEHOLDER);

    match (has_columns, columns) {
        (false, Some(_)) => return Err(TemplateError::UnexpectedColumns),
        (true, None) => return Err(TemplateError::MissingColumns),
        (true, Some(cols)) if cols.is_empty() => return Err(TemplateError::MissingColumns),
        _ => {}
    }
    match (has_where, constraints) {
        (false, Some(_)) => return Err(TemplateError::UnexpectedConstraints),
        (true, None) => return Err(TemplateError::MissingConstraints),
        _ => {}
    }

    let mut params = Vec::new();
    let mut sql = template.to_string();

    if let Some(constraints) = constraints {
        let clause = where_clause(constraints, &mut params);
        sql = sql.replace(WHERE_PLACEHOLDER, &clause);
    }
    if let Some(cols) = columns {
        sql = sql.replace(COLUMNS_PLACEHOLDER, &cols.join(", "));
    }
    if let Some(order) = order_by.filter(|o| !o.is_empty()) {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(limit) = limit {
        let n = parse_limit(limit)?;
        sql.push_str(&format!(" LIMIT {}", n));
    }

    Ok(Statement { sql, params })
}

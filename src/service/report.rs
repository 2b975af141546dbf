//! Generic report execution: request parameters -> statement -> rows -> camelCase -> JSON/XML.

use crate::case::{rows_to_camel_case, Row};
use crate::error::AppError;
use crate::format::{render, ResponseFormat};
use crate::sql::{assemble, parse_parameters, Constraint, ParamSchema, Statement};
use axum::response::Response;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-row rewrite applied after key conversion, before serialization.
pub type RowHook = Arc<dyn Fn(&mut Row) + Send + Sync>;

/// Declarative report: SQL template plus everything needed to fill and shape it.
#[derive(Clone)]
pub struct Report {
    template: String,
    columns: Option<Vec<String>>,
    params: Option<ParamSchema>,
    constraints: Vec<Constraint>,
    order_by: Option<String>,
    limit: Option<String>,
    single_row: bool,
    row_hook: Option<RowHook>,
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("template", &self.template)
            .field("columns", &self.columns)
            .field("params", &self.params)
            .field("constraints", &self.constraints)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("single_row", &self.single_row)
            .field("row_hook", &self.row_hook.is_some())
            .finish()
    }
}

impl Report {
    pub fn new(template: impl Into<String>) -> Self {
        Report {
            template: template.into(),
            columns: None,
            params: None,
            constraints: Vec::new(),
            order_by: None,
            limit: None,
            single_row: false,
            row_hook: None,
        }
    }

    /// Fills `${COLUMNS}`.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Request parameters that become `${WHERE}` constraints.
    pub fn params(mut self, schema: ParamSchema) -> Self {
        self.params = Some(schema);
        self
    }

    /// Fixed fragment ANDed after the parameter constraints.
    pub fn constraint(mut self, fragment: impl Into<String>) -> Self {
        self.constraints.push(Constraint::raw(fragment));
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Exactly one row is expected; it is returned unwrapped.
    pub fn single_row(mut self) -> Self {
        self.single_row = true;
        self
    }

    pub fn map_rows<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Row) + Send + Sync + 'static,
    {
        self.row_hook = Some(Arc::new(hook));
        self
    }

    /// Parse the request parameters and assemble the statement. No I/O.
    pub fn statement(&self, request: &HashMap<String, String>) -> Result<Statement, AppError> {
        let mut constraints = match &self.params {
            Some(schema) => Some(parse_parameters(request, schema)?),
            None => None,
        };
        if !self.constraints.is_empty() {
            constraints
                .get_or_insert_with(Vec::new)
                .extend(self.constraints.iter().cloned());
        }
        let stmt = assemble(
            &self.template,
            self.columns.as_deref(),
            constraints.as_deref(),
            self.order_by.as_deref(),
            self.limit.as_deref(),
        )?;
        Ok(stmt)
    }

    /// camelCase the rows, run the row hook, and apply the single-row rule.
    pub fn shape(&self, mut rows: Vec<Row>) -> Result<Value, AppError> {
        rows_to_camel_case(&mut rows);
        if let Some(hook) = &self.row_hook {
            for row in rows.iter_mut() {
                hook(row);
            }
        }
        if !self.single_row {
            return Ok(Value::Array(rows.into_iter().map(Value::Object).collect()));
        }
        match rows.len() {
            0 => Ok(Value::Null),
            1 => Ok(rows.pop().map(Value::Object).unwrap_or(Value::Null)),
            n => Err(AppError::TooManyRows(n)),
        }
    }
}

pub struct ReportService;

impl ReportService {
    /// Run a report for one request and build the HTTP response.
    ///
    /// Parameter and template errors surface before any connection is taken.
    pub async fn run(
        pool: &PgPool,
        report: &Report,
        request: &HashMap<String, String>,
        format: ResponseFormat,
    ) -> Result<Response, AppError> {
        let stmt = report.statement(request)?;
        let rows = Self::fetch(pool, &stmt).await?;
        tracing::debug!(rows = rows.len(), %format, "report rows fetched");
        let data = report.shape(rows)?;
        render(format, data)
    }

    /// Execute raw SQL and return the rows with camelCase keys, always as a list.
    pub async fn retrieve(pool: &PgPool, sql: &str) -> Result<Vec<Row>, AppError> {
        let mut rows = Self::fetch(pool, &Statement::new(sql)).await?;
        rows_to_camel_case(&mut rows);
        Ok(rows)
    }

    /// One pooled connection per statement; it goes back to the pool whether the query
    /// succeeded or not. Failures are returned as is, without retry.
    pub async fn fetch(pool: &PgPool, stmt: &Statement) -> Result<Vec<Row>, AppError> {
        let mut conn = pool.acquire().await.map_err(AppError::Connection)?;

        tracing::debug!(sql = %stmt.sql, params = stmt.params.len(), inlined = %stmt, "executing report query");
        let mut query = sqlx::query(&stmt.sql);
        for p in &stmt.params {
            query = p.bind(query);
        }
        let result = query.fetch_all(&mut *conn).await;
        drop(conn);
        tracing::debug!("connection released");

        let rows = result.map_err(|source| AppError::Query {
            sql: stmt.sql.clone(),
            source,
        })?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, i));
    }
    map
}

/// Decode one cell by probing the supported Postgres types.
/// NUMERIC has no decoder here; report templates cast it (`::float8` or `::text`).
fn cell_to_value(row: &sqlx::postgres::PgRow, idx: usize) -> Value {
    use sqlx::{Column, Row as _, TypeInfo};
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(idx) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(idx) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return Value::String(d.to_rfc3339());
    }
    // Local timestamps and dates go out as plain strings, no timezone shifting.
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(idx) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(idx) {
        return j;
    }
    if let Ok(raw) = row.try_get_raw(idx) {
        use sqlx::ValueRef;
        if !raw.is_null() {
            let col = &row.columns()[idx];
            tracing::debug!(column = col.name(), pg_type = col.type_info().name(), "column type not decoded, sending null");
        }
    }
    Value::Null
}

//! Data sets: named snapshots of the newest import of a group of tables, releasable once.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use regex::Regex;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::LazyLock;

pub const DATA_SETS_TABLE: &str = "_data_sets";
pub const DATA_SET_DATA_TABLE: &str = "_data_set_data";

/// Create the two bookkeeping tables if missing. Safe to run on every start.
pub async fn ensure_data_set_tables(pool: &PgPool) -> Result<(), AppError> {
    let data_sets_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            data_set_id BIGSERIAL PRIMARY KEY,
            type TEXT NOT NULL,
            cdate TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            released BOOLEAN NOT NULL DEFAULT FALSE,
            release_date TIMESTAMPTZ,
            release_comment TEXT
        )
        "#,
        DATA_SETS_TABLE
    );
    sqlx::query(&data_sets_ddl).execute(pool).await?;

    let data_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            data_set_id BIGINT NOT NULL REFERENCES {}(data_set_id),
            table_name TEXT NOT NULL,
            table_import_key TEXT,
            PRIMARY KEY (data_set_id, table_name)
        )
        "#,
        DATA_SET_DATA_TABLE, DATA_SETS_TABLE
    );
    sqlx::query(&data_ddl).execute(pool).await?;
    Ok(())
}

static TABLE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("TABLE_NAME_REGEX pattern is valid")
});

/// Table names end up in SQL text, so only plain (optionally schema-qualified) identifiers pass.
pub fn validate_table_names(table_names: &[String]) -> Result<(), AppError> {
    let invalid: Vec<&str> = table_names
        .iter()
        .filter(|t| !TABLE_NAME_REGEX.is_match(t))
        .map(String::as_str)
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid table name(s): {}", invalid.join(", "))))
    }
}

/// Insert a data set and link each table's newest import. Returns the new id once every
/// link row is written; the link inserts run concurrently.
pub async fn create_data_set(pool: &PgPool, data_set_type: &str, table_names: &[String]) -> Result<i64, AppError> {
    validate_table_names(table_names)?;

    let (id,): (i64,) = sqlx::query_as(&format!(
        "INSERT INTO {} (type, cdate) VALUES ($1, NOW()) RETURNING data_set_id",
        DATA_SETS_TABLE
    ))
    .bind(data_set_type)
    .fetch_one(pool)
    .await?;
    tracing::debug!(data_set_id = id, tables = table_names.len(), "data set created");

    let links = table_names.iter().map(|table| {
        let sql = format!(
            "INSERT INTO {} (data_set_id, table_name, table_import_key) \
             SELECT $1, $2, import_date::text FROM {} ORDER BY import_date DESC LIMIT 1",
            DATA_SET_DATA_TABLE, table
        );
        async move {
            sqlx::query(&sql).bind(id).bind(table).execute(pool).await?;
            Ok::<_, sqlx::Error>(())
        }
    });
    try_join_all(links).await?;

    tracing::info!(data_set_id = id, data_set_type, "data set linked to {} table(s)", table_names.len());
    Ok(id)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released(i64),
    AlreadyReleased(i64),
}

impl ReleaseOutcome {
    pub fn message(&self) -> String {
        match self {
            ReleaseOutcome::Released(id) => format!("data set {} has been released successfully", id),
            ReleaseOutcome::AlreadyReleased(id) => {
                format!("data set {} has already been released. No change.", id)
            }
        }
    }
}

/// One-way transition to released. Repeating it changes nothing; an unknown id is `RowNotFound`.
pub async fn release_data_set(pool: &PgPool, id: i64, comment: Option<&str>) -> Result<ReleaseOutcome, AppError> {
    let (released,): (bool,) = sqlx::query_as(&format!(
        "SELECT released FROM {} WHERE data_set_id = $1",
        DATA_SETS_TABLE
    ))
    .bind(id)
    .fetch_one(pool)
    .await?;
    if released {
        return Ok(ReleaseOutcome::AlreadyReleased(id));
    }

    let result = sqlx::query(&format!(
        "UPDATE {} SET released = TRUE, release_date = NOW(), release_comment = $2 \
         WHERE data_set_id = $1 AND NOT released",
        DATA_SETS_TABLE
    ))
    .bind(id)
    .bind(comment)
    .execute(pool)
    .await?;

    // Lost a race against another release of the same id.
    if result.rows_affected() == 0 {
        return Ok(ReleaseOutcome::AlreadyReleased(id));
    }
    tracing::info!(data_set_id = id, "data set released");
    Ok(ReleaseOutcome::Released(id))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSetTable {
    pub table_name: String,
    pub table_import_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    pub data_set_id: i64,
    #[serde(rename = "type")]
    pub data_set_type: String,
    pub cdate: DateTime<Utc>,
    pub released: bool,
    pub release_date: Option<DateTime<Utc>>,
    pub release_comment: Option<String>,
    pub tables: Vec<DataSetTable>,
}

pub async fn get_data_set(pool: &PgPool, id: i64) -> Result<DataSet, AppError> {
    let (data_set_id, data_set_type, cdate, released, release_date, release_comment): (
        i64,
        String,
        DateTime<Utc>,
        bool,
        Option<DateTime<Utc>>,
        Option<String>,
    ) = sqlx::query_as(&format!(
        "SELECT data_set_id, type, cdate, released, release_date, release_comment FROM {} WHERE data_set_id = $1",
        DATA_SETS_TABLE
    ))
    .bind(id)
    .fetch_one(pool)
    .await?;

    let tables: Vec<(String, Option<String>)> = sqlx::query_as(&format!(
        "SELECT table_name, table_import_key FROM {} WHERE data_set_id = $1 ORDER BY table_name",
        DATA_SET_DATA_TABLE
    ))
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(DataSet {
        data_set_id,
        data_set_type,
        cdate,
        released,
        release_date,
        release_comment,
        tables: tables
            .into_iter()
            .map(|(table_name, table_import_key)| DataSetTable {
                table_name,
                table_import_key,
            })
            .collect(),
    })
}

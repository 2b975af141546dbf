//! Needs a disposable Postgres: `DATABASE_URL=... cargo test -- --ignored`.

use report_api::sql::{ParamSchema, ParamType, Statement};
use report_api::{AppError, Report, ReportService};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;

async fn pool() -> sqlx::PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect(&url)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_failing_query_returns_connection_to_pool() {
    let pool = pool().await;
    ReportService::fetch(&pool, &Statement::new("SELECT 1")).await.unwrap();
    let size_before = pool.size();

    let err = ReportService::fetch(&pool, &Statement::new("SELECT * FROM no_such_table"))
        .await
        .unwrap_err();
    match err {
        AppError::Query { sql, .. } => assert_eq!(sql, "SELECT * FROM no_such_table"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(pool.size(), size_before);
    // The single pooled connection must be free again.
    ReportService::fetch(&pool, &Statement::new("SELECT 1")).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_rows_come_back_camel_cased() {
    let pool = pool().await;
    let rows = ReportService::retrieve(&pool, "SELECT 1::int4 AS task_budgeted_hours, 'x'::text AS project_name")
        .await
        .unwrap();
    assert_eq!(
        serde_json::Value::Object(rows[0].clone()),
        json!({ "taskBudgetedHours": 1, "projectName": "x" })
    );
}

#[tokio::test]
#[ignore]
async fn test_single_row_report_over_bound_parameter() {
    let pool = pool().await;
    let report = Report::new("SELECT n AS import_no FROM generate_series(1, 5) AS n ${WHERE}")
        .params(ParamSchema::new().param("item", ParamType::Numeric, "n", true))
        .single_row();
    let request = HashMap::from([("item".to_string(), "3".to_string())]);
    let stmt = report.statement(&request).unwrap();
    let rows = ReportService::fetch(&pool, &stmt).await.unwrap();
    assert_eq!(report.shape(rows).unwrap(), json!({ "importNo": 3 }));
}

#[tokio::test]
#[ignore]
async fn test_string_parameters_filter_non_text_columns() {
    let pool = pool().await;
    sqlx::query("CREATE TABLE IF NOT EXISTS it_typed (import_date DATE NOT NULL, fiscal_year INT NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM it_typed").execute(&pool).await.unwrap();
    sqlx::query("INSERT INTO it_typed VALUES ('2016-01-01', 2016), ('2017-01-01', 2017)")
        .execute(&pool)
        .await
        .unwrap();

    let report = Report::new("SELECT fiscal_year FROM it_typed ${WHERE}")
        .params(ParamSchema::new().column("d", "import_date").column("year", "fiscal_year"));

    for request in [
        HashMap::from([("d".to_string(), "2016-01-01".to_string())]),
        HashMap::from([("year".to_string(), "2016".to_string())]),
    ] {
        let stmt = report.statement(&request).unwrap();
        let rows = ReportService::fetch(&pool, &stmt).await.unwrap();
        assert_eq!(report.shape(rows).unwrap(), json!([{ "fiscalYear": 2016 }]));
    }
}

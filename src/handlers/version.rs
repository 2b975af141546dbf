//! Effort history per project: budgeted vs. actual hours for every import.

use crate::error::AppError;
use crate::format::ResponseFormat;
use crate::service::{Report, ReportService};
use crate::sql::{ParamSchema, ParamType};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::Response,
};
use std::collections::HashMap;

const VERSION_TEMPLATE: &str = "SELECT import_date, \
     SUM(task_budgeted_hours)::float8 AS task_budgeted_hours, \
     SUM(task_actual_hours)::float8 AS task_actual_hours, \
     SUM(task_ts_actual_hours)::float8 AS task_ts_actual_hours \
     FROM ia_primavera_aufwand ${WHERE} GROUP BY import_date";

fn item_schema() -> ParamSchema {
    ParamSchema::new().param("item", ParamType::Numeric, "project_number", true)
}

/// All imports of a project, oldest first.
pub fn version_history_report() -> Report {
    Report::new(VERSION_TEMPLATE)
        .params(item_schema())
        .order_by("import_date")
}

/// Newest import only, unwrapped from the list.
pub fn latest_version_report() -> Report {
    Report::new(VERSION_TEMPLATE)
        .params(item_schema())
        .order_by("import_date DESC")
        .limit("1")
        .single_row()
}

/// Item codes may carry a letter prefix (`P123`); the project number is what follows it.
pub fn strip_item_prefix(item: &str) -> &str {
    let digits = item.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if digits.is_empty() {
        item
    } else {
        digits
    }
}

fn normalize_item(mut params: HashMap<String, String>) -> HashMap<String, String> {
    if let Some(item) = params.get_mut("item") {
        *item = strip_item_prefix(item).to_string();
    }
    params
}

pub async fn version_history(
    State(state): State<AppState>,
    format: ResponseFormat,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let params = normalize_item(params);
    ReportService::run(&state.pool, &version_history_report(), &params, format).await
}

pub async fn latest_version(
    State(state): State<AppState>,
    format: ResponseFormat,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let params = normalize_item(params);
    ReportService::run(&state.pool, &latest_version_report(), &params, format).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::BindValue;

    fn request(item: &str) -> HashMap<String, String> {
        normalize_item(HashMap::from([("item".to_string(), item.to_string())]))
    }

    #[test]
    fn strips_letter_prefix() {
        assert_eq!(strip_item_prefix("P123"), "123");
        assert_eq!(strip_item_prefix("123"), "123");
        assert_eq!(strip_item_prefix("PRJ42"), "42");
        assert_eq!(strip_item_prefix("P"), "P");
    }

    #[test]
    fn history_filters_by_project_number() {
        let stmt = version_history_report().statement(&request("P123")).unwrap();
        assert!(stmt.sql.contains("FROM ia_primavera_aufwand WHERE project_number=$1 GROUP BY import_date"));
        assert!(stmt.sql.ends_with("ORDER BY import_date"));
        assert_eq!(stmt.params, vec![BindValue::Int(123)]);
        assert_eq!(stmt.to_string().matches("project_number=123").count(), 1);
    }

    #[test]
    fn latest_takes_newest_single_row() {
        let stmt = latest_version_report().statement(&request("123")).unwrap();
        assert!(stmt.sql.ends_with("ORDER BY import_date DESC LIMIT 1"));
    }

    #[test]
    fn item_is_mandatory_and_numeric() {
        let missing = version_history_report().statement(&HashMap::new()).unwrap_err();
        assert_eq!(missing.to_string(), "missing mandatory parameter item");

        let bad = version_history_report().statement(&request("Pabc")).unwrap_err();
        assert_eq!(bad.to_string(), "parameter [item] should be numeric but is [Pabc]");
    }
}

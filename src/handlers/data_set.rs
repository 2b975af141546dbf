//! HTTP surface of the data set manager. Answers with the `{data, info}` / `{error}` envelopes.

use crate::case::keys_to_snake_case;
use crate::error::AppError;
use crate::response::{send_result, success, Success};
use crate::service::{create_data_set, get_data_set, release_data_set, DataSet};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde_json::Value;

/// Request body after key conversion: `type` and `table_names`.
fn parse_create_body(mut body: Value) -> Result<(String, Vec<String>), AppError> {
    keys_to_snake_case(&mut body);
    let data_set_type = body
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("type is mandatory".into()))?
        .to_string();
    let items = match body.get("table_names") {
        Some(Value::Array(items)) => items,
        _ => return Err(AppError::Validation("tables must be an array".into())),
    };
    let tables = items
        .iter()
        .map(|t| {
            t.as_str()
                .map(str::to_string)
                .ok_or_else(|| AppError::Validation(format!("table name must be a string, got {}", t)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((data_set_type, tables))
}

async fn create_inner(state: &AppState, body: Value) -> Result<Success<i64>, AppError> {
    let (data_set_type, tables) = parse_create_body(body)?;
    let id = create_data_set(&state.pool, &data_set_type, &tables).await?;
    Ok(success(id, Some(format!("data set {} created", id))))
}

pub async fn create(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    send_result(create_inner(&state, body).await)
}

pub async fn read(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    send_result(get_data_set(&state.pool, id).await.map(|ds: DataSet| success(ds, None)))
}

pub async fn release(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<Value>>,
) -> Response {
    let comment = body
        .as_ref()
        .and_then(|Json(b)| b.get("comment"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let result = release_data_set(&state.pool, id, comment.as_deref())
        .await
        .map(|outcome| success(id, Some(outcome.message())));
    send_result(result)
}

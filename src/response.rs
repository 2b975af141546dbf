//! `{data, info}` / `{error}` envelopes for the generic data operations.

use crate::error::{AppError, ErrorEnvelope};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct Success<T> {
    pub data: T,
    pub info: Option<String>,
}

#[derive(Serialize)]
pub struct Failure {
    pub error: ErrorEnvelope,
}

pub fn success<T: Serialize>(data: T, info: Option<String>) -> Success<T> {
    Success { data, info }
}

pub fn error_body(err: &AppError) -> Failure {
    Failure {
        error: err.envelope(),
    }
}

/// 200 with `{data, info}`, or the error's status with `{error}`.
pub fn send_result<T: Serialize>(result: Result<Success<T>, AppError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            err.log();
            (err.status(), Json(error_body(&err))).into_response()
        }
    }
}

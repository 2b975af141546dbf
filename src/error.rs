//! Error registry, the `{errorCode, message, errorObj}` envelope, and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Fixed registry of error codes exposed over the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Generic,
    WrongCredentials,
    SqlError,
    ValidationError,
    ConnectionError,
    WrongSpatialFormat,
    WrongParameters,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 7] = [
        ErrorCode::Generic,
        ErrorCode::WrongCredentials,
        ErrorCode::SqlError,
        ErrorCode::ValidationError,
        ErrorCode::ConnectionError,
        ErrorCode::WrongSpatialFormat,
        ErrorCode::WrongParameters,
    ];

    pub fn code(self) -> u16 {
        match self {
            ErrorCode::Generic => 1000,
            ErrorCode::WrongCredentials => 1001,
            ErrorCode::SqlError => 1002,
            ErrorCode::ValidationError => 1003,
            ErrorCode::ConnectionError => 1004,
            ErrorCode::WrongSpatialFormat => 1005,
            ErrorCode::WrongParameters => 1006,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::Generic => "Generic error",
            ErrorCode::WrongCredentials => "Wrong credentials",
            ErrorCode::SqlError => "SQL error",
            ErrorCode::ValidationError => "Validation error",
            ErrorCode::ConnectionError => "Connection error",
            ErrorCode::WrongSpatialFormat => "Wrong spatial format",
            ErrorCode::WrongParameters => "Wrong parameters",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown error code [{0}]")]
pub struct UnknownErrorCode(pub u16);

impl TryFrom<u16> for ErrorCode {
    type Error = UnknownErrorCode;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        ErrorCode::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(UnknownErrorCode(code))
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

/// Uniform error body. Built once per failure and sent as is.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error_code: ErrorCode,
    pub message: String,
    pub error_obj: Option<Value>,
}

impl ErrorEnvelope {
    /// Envelope with the registry's default message and no error object.
    pub fn new(code: ErrorCode) -> Self {
        ErrorEnvelope {
            error_code: code,
            message: code.default_message().to_string(),
            error_obj: None,
        }
    }

    /// Build from a raw numeric code. Unknown codes are a programming error.
    pub fn from_code(code: u16) -> Result<Self, UnknownErrorCode> {
        ErrorCode::try_from(code).map(ErrorEnvelope::new)
    }

    /// Generic error (1000) carrying free text as its error object.
    pub fn generic(text: impl Into<String>) -> Self {
        ErrorEnvelope::new(ErrorCode::Generic).with_object(Value::String(text.into()))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_object(mut self, obj: Value) -> Self {
        self.error_obj = Some(obj);
        self
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("missing setting {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// SQL template misconfiguration. Raised by route definitions, never by request input.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("SQL template has placeholder COLUMNS but there are no columns provided")]
    MissingColumns,
    #[error("SQL template has no placeholder COLUMNS but there are column definitions")]
    UnexpectedColumns,
    #[error("SQL template has placeholder WHERE but there are no constraint definitions")]
    MissingConstraints,
    #[error("SQL template has no placeholder WHERE but there are constraint definitions")]
    UnexpectedConstraints,
    #[error("limit value must be an integer, but is [{0}]")]
    InvalidLimit(String),
}

/// All problems found in the request parameters, in schema order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .messages.join("\n"))]
pub struct ParameterError {
    pub messages: Vec<String>,
}

#[derive(Error, Debug)]
#[error("xml: {0}")]
pub struct XmlError(pub String);

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Parameters(#[from] ParameterError),
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("connection: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("query failed: {source}")]
    Query {
        sql: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("too many rows selected while \"singleRow\" specified: {0}")]
    TooManyRows(usize),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("validation: {0}")]
    Validation(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Settings(_) | AppError::Template(_) | AppError::Xml(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Parameters(_) => StatusCode::NOT_FOUND,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Connection(_)
            | AppError::Query { .. }
            | AppError::TooManyRows(_)
            | AppError::Db(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            AppError::Settings(_) | AppError::Template(_) | AppError::Xml(_) => {
                ErrorEnvelope::generic(self.to_string())
            }
            AppError::Parameters(e) => ErrorEnvelope::new(ErrorCode::WrongParameters)
                .with_message(e.to_string())
                .with_object(Value::from(e.messages.clone())),
            AppError::Connection(_) => ErrorEnvelope::new(ErrorCode::ConnectionError).with_message(
                "Error trying to connect to database. See the server's logfile for details.",
            ),
            AppError::Query { sql, source } => ErrorEnvelope::new(ErrorCode::SqlError)
                .with_message("Query error")
                .with_object(serde_json::json!({
                    "message": source.to_string(),
                    "sql": sql,
                })),
            AppError::TooManyRows(count) => ErrorEnvelope::new(ErrorCode::SqlError)
                .with_message("Too many rows selected while \"singleRow\" specified")
                .with_object(serde_json::json!({ "rows": count })),
            AppError::Db(e) => ErrorEnvelope::new(ErrorCode::SqlError)
                .with_message("Query error")
                .with_object(serde_json::json!({ "message": e.to_string() })),
            AppError::Validation(msg) => {
                ErrorEnvelope::new(ErrorCode::ValidationError).with_message(msg.clone())
            }
        }
    }

    /// Driver details only reach the log, never the client.
    pub fn log(&self) {
        match self {
            AppError::Connection(e) => tracing::error!(error = %e, "database connection error"),
            AppError::Query { sql, source } => tracing::warn!(error = %source, sql = %sql, "query error"),
            AppError::Settings(_) | AppError::Template(_) | AppError::Xml(_) => {
                tracing::error!(error = %self, "internal error")
            }
            _ => tracing::debug!(error = %self, "request failed"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        (self.status(), Json(self.envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_known_codes() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
        assert_eq!(ErrorCode::try_from(1007), Err(UnknownErrorCode(1007)));
        assert_eq!(ErrorCode::try_from(999), Err(UnknownErrorCode(999)));
    }

    #[test]
    fn from_code_uses_default_message() {
        let e = ErrorEnvelope::from_code(1004).unwrap();
        assert_eq!(e.error_code, ErrorCode::ConnectionError);
        assert_eq!(e.message, "Connection error");
        assert!(e.error_obj.is_none());
        assert!(ErrorEnvelope::from_code(42).is_err());
    }

    #[test]
    fn envelope_serializes_camel_case_with_null_object() {
        let json = serde_json::to_value(ErrorEnvelope::new(ErrorCode::SqlError)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "errorCode": 1002, "message": "SQL error", "errorObj": null })
        );
    }

    #[test]
    fn generic_keeps_text_as_object() {
        let e = ErrorEnvelope::generic("No item selected!");
        assert_eq!(e.error_code.code(), 1000);
        assert_eq!(e.message, "Generic error");
        assert_eq!(e.error_obj, Some(Value::String("No item selected!".into())));
    }

    #[test]
    fn parameter_error_lists_every_message() {
        let err = AppError::from(ParameterError {
            messages: vec![
                "missing mandatory parameter item".into(),
                "parameter [year] should be numeric but is [abc]".into(),
            ],
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let env = err.envelope();
        assert_eq!(env.error_code, ErrorCode::WrongParameters);
        assert_eq!(
            env.message,
            "missing mandatory parameter item\nparameter [year] should be numeric but is [abc]"
        );
    }

    #[test]
    fn query_error_carries_sql() {
        let err = AppError::Query {
            sql: "SELECT nope".into(),
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let env = err.envelope();
        assert_eq!(env.error_code, ErrorCode::SqlError);
        assert_eq!(env.message, "Query error");
        assert_eq!(env.error_obj.unwrap()["sql"], "SELECT nope");
    }

    #[test]
    fn missing_data_set_row_is_not_found() {
        assert_eq!(AppError::Db(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Db(sqlx::Error::PoolClosed).status(),
            StatusCode::BAD_REQUEST
        );
    }
}

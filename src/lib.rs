//! Report API: parameterized SQL reports over HTTP as JSON or XML, plus data set versioning.

pub mod case;
pub mod config;
pub mod error;
pub mod format;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod xml;

pub use config::Settings;
pub use error::{AppError, ErrorCode, ErrorEnvelope, ParameterError, SettingsError, TemplateError};
pub use format::ResponseFormat;
pub use response::{send_result, success};
pub use routes::{app, auth_routes, common_routes, data_set_routes, report_routes};
pub use service::{ensure_data_set_tables, Report, ReportService};
pub use state::AppState;

//! HTTP handlers: effort reports, data sets, session and SSO redirects.

pub mod auth;
pub mod data_set;
pub mod version;
pub use version::{latest_version_report, strip_item_prefix, version_history_report};

//! Response format negotiation from the Accept header, and rendering of report data.

use crate::case::Row;
use crate::error::AppError;
use crate::state::AppState;
use crate::xml::to_xml;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// XML unless configured otherwise: the spreadsheet clients send no usable Accept header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    #[default]
    Xml,
}

impl ResponseFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ResponseFormat::Json => "application/json",
            ResponseFormat::Xml => "application/xml",
        }
    }

    fn from_media_type(media: &str, default: ResponseFormat) -> Option<ResponseFormat> {
        match media {
            "application/json" => Some(ResponseFormat::Json),
            "application/xml" | "text/xml" => Some(ResponseFormat::Xml),
            "*/*" | "application/*" => Some(default),
            _ => None,
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ResponseFormat::Json),
            "xml" => Ok(ResponseFormat::Xml),
            other => Err(format!("unknown response format [{}], expected json or xml", other)),
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Xml => "xml",
        })
    }
}

/// Pick the output format for an Accept header.
///
/// Media ranges are tried by descending `q` (ties keep header order). No header, or a
/// wildcard, gives `default`. `None` means nothing acceptable was offered.
pub fn negotiate(accept: Option<&str>, default: ResponseFormat) -> Option<ResponseFormat> {
    let accept = match accept.map(str::trim) {
        None | Some("") => return Some(default),
        Some(a) => a,
    };

    let mut ranges: Vec<(String, f32)> = Vec::new();
    for entry in accept.split(',') {
        let mut parts = entry.split(';');
        let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        if media.is_empty() {
            continue;
        }
        let q = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        if q > 0.0 {
            ranges.push((media, q));
        }
    }
    ranges.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    ranges
        .iter()
        .find_map(|(media, _)| ResponseFormat::from_media_type(media, default))
}

/// 406 for requests that accept neither JSON nor XML.
#[derive(Debug, Clone, Copy)]
pub struct NotAcceptable;

impl IntoResponse for NotAcceptable {
    fn into_response(self) -> Response {
        (StatusCode::NOT_ACCEPTABLE, "Not Acceptable").into_response()
    }
}

/// Middleware: resolve the format once per request and store it in the request extensions.
pub async fn negotiate_format(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    match negotiate(accept, state.settings.default_response_format) {
        Some(format) => {
            tracing::debug!(%format, "response format");
            req.extensions_mut().insert(format);
            next.run(req).await
        }
        None => {
            tracing::debug!(accept = ?accept, uri = %req.uri(), "no acceptable response format");
            NotAcceptable.into_response()
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ResponseFormat
where
    S: Send + Sync,
{
    type Rejection = NotAcceptable;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(format) = parts.extensions.get::<ResponseFormat>() {
            return Ok(*format);
        }
        let accept = parts
            .headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok());
        negotiate(accept, ResponseFormat::default()).ok_or(NotAcceptable)
    }
}

fn xml_rows(data: &Value) -> Vec<Row> {
    match data {
        Value::Array(items) => items.iter().filter_map(|v| v.as_object().cloned()).collect(),
        Value::Object(row) => vec![row.clone()],
        _ => Vec::new(),
    }
}

/// 200 response with `data` in the requested format and a matching content type.
pub fn render(format: ResponseFormat, data: Value) -> Result<Response, AppError> {
    match format {
        ResponseFormat::Json => Ok((StatusCode::OK, Json(data)).into_response()),
        ResponseFormat::Xml => {
            let body = to_xml(&xml_rows(&data))?;
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, ResponseFormat::Xml.content_type())],
                body,
            )
                .into_response())
        }
    }
}

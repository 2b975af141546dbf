//! Router assembly: report, data set, auth and health routes plus the shared layers.

mod common;
pub use common::common_routes;

use crate::error::SettingsError;
use crate::format::negotiate_format;
use crate::handlers::{auth, data_set, version};
use crate::state::AppState;
use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// GET /version, GET /version/latest. Output format follows the Accept header.
pub fn report_routes(state: AppState) -> Router {
    Router::new()
        .route("/version", get(version::version_history))
        .route("/version/latest", get(version::latest_version))
        .route_layer(middleware::from_fn_with_state(state.clone(), negotiate_format))
        .with_state(state)
}

/// POST /dataSets, GET /dataSets/:id, POST /dataSets/:id/release.
pub fn data_set_routes(state: AppState) -> Router {
    Router::new()
        .route("/dataSets", post(data_set::create))
        .route("/dataSets/:id", get(data_set::read))
        .route("/dataSets/:id/release", post(data_set::release))
        .with_state(state)
}

/// GET /isLoggedIn, GET /login, GET /logout.
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/isLoggedIn", get(auth::is_logged_in))
        .route("/login", get(auth::login))
        .route("/logout", get(auth::logout))
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, &'static str) {
    tracing::debug!(%uri, "no route");
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Every OPTIONS request ends here with 200, preflight or not.
async fn answer_options(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(req).await
}

/// CORS for one configured origin. `*` echoes the caller's origin, since credentials
/// are allowed and browsers reject a literal wildcard with them.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, SettingsError> {
    let allow_origin = if origin == "*" {
        AllowOrigin::mirror_request()
    } else {
        let value = HeaderValue::from_str(origin).map_err(|e| SettingsError::Invalid {
            name: "ACCESS_CONTROL_ALLOW_ORIGIN",
            reason: e.to_string(),
        })?;
        AllowOrigin::exact(value)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::CONTENT_LENGTH,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true))
}

/// Full application router.
pub fn app(state: AppState) -> Result<Router, SettingsError> {
    let origin = state.settings.access_control_allow_origin.clone();
    let router = Router::new()
        .merge(common_routes(state.clone()))
        .merge(auth_routes(state.clone()))
        .merge(report_routes(state.clone()))
        .merge(data_set_routes(state))
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    let router = match origin {
        Some(origin) => {
            tracing::info!(%origin, "CORS configured");
            router
                .layer(middleware::from_fn(answer_options))
                .layer(cors_layer(&origin)?)
        }
        None => {
            tracing::info!("No CORS configured");
            router
        }
    };
    Ok(router.layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::body::{to_bytes, Body};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(settings: Settings) -> AppState {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        AppState::new(pool, settings)
    }

    fn router() -> Router {
        app(state(Settings::default())).unwrap()
    }

    async fn send(app: Router, req: axum::http::Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec();
        (status, headers, body)
    }

    fn get_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = send(router(), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], "ok");
    }

    #[tokio::test]
    async fn test_unsupported_accept_is_406() {
        let req = axum::http::Request::builder()
            .uri("/version?item=P123")
            .header(header::ACCEPT, "text/csv")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(router(), req).await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_missing_item_is_404_before_touching_database() {
        let (status, _, body) = send(router(), get_req("/version")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["errorCode"], 1006);
        assert_eq!(v["message"], "missing mandatory parameter item");
        assert_eq!(v["errorObj"], serde_json::json!(["missing mandatory parameter item"]));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connection_error() {
        let (status, _, body) = send(router(), get_req("/version/latest?item=P123")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["errorCode"], 1004);
        assert_eq!(
            v["message"],
            "Error trying to connect to database. See the server's logfile for details."
        );
    }

    #[tokio::test]
    async fn test_is_logged_in() {
        let (status, _, body) = send(router(), get_req("/isLoggedIn")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, b"No Session detected");

        let req = axum::http::Request::builder()
            .uri("/isLoggedIn")
            .header(header::COOKIE, "connect.sid=s%3Aabc")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(router(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"Session is valid");
    }

    #[tokio::test]
    async fn test_login_without_sso_is_404() {
        let (status, _, _) = send(router(), get_req("/login")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, _, _) = send(router(), get_req("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_data_set_body_must_list_tables() {
        let req = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/dataSets")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"type":"monthly","tableNames":"ia_projects"}"#))
            .unwrap();
        let (status, _, body) = send(router(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["error"]["errorCode"], 1003);
        assert_eq!(v["error"]["message"], "tables must be an array");
    }

    #[tokio::test]
    async fn test_cors_options_short_circuit() {
        let settings = Settings {
            access_control_allow_origin: Some("https://reports.example.com".into()),
            ..Settings::default()
        };
        let app = app(state(settings)).unwrap();
        let req = axum::http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/version")
            .header(header::ORIGIN, "https://reports.example.com")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://reports.example.com"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_no_cors_headers_without_origin_setting() {
        let req = axum::http::Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://reports.example.com")
            .body(Body::empty())
            .unwrap();
        let (_, headers, _) = send(router(), req).await;
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn test_invalid_origin_is_a_settings_error() {
        assert!(matches!(
            cors_layer("bad\norigin"),
            Err(SettingsError::Invalid { name: "ACCESS_CONTROL_ALLOW_ORIGIN", .. })
        ));
    }
}

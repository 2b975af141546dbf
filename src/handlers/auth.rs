//! Session check and single sign-on redirects. Ticket validation happens on the SSO server.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

/// True when the named cookie is present with a non-empty value.
pub fn has_session(jar: &CookieJar, cookie_name: &str) -> bool {
    jar.get(cookie_name)
        .map(|c| !c.value().trim().is_empty())
        .unwrap_or(false)
}

/// Expired, empty session cookie that makes the browser drop it.
pub fn logout_cookie(cookie_name: &str) -> Cookie<'static> {
    Cookie::build((cookie_name.to_string(), ""))
        .path("/")
        .max_age(cookie::time::Duration::ZERO)
        .build()
}

pub async fn is_logged_in(State(state): State<AppState>, jar: CookieJar) -> (StatusCode, &'static str) {
    if has_session(&jar, &state.settings.session_cookie) {
        (StatusCode::OK, "Session is valid")
    } else {
        (StatusCode::UNAUTHORIZED, "No Session detected")
    }
}

fn sso_not_configured() -> Response {
    (StatusCode::NOT_FOUND, "Single sign-on is not configured").into_response()
}

pub async fn login(State(state): State<AppState>) -> Response {
    match &state.settings.cas {
        Some(cas) => (StatusCode::FOUND, [(header::LOCATION, cas.login_url())]).into_response(),
        None => sso_not_configured(),
    }
}

/// Drops the local session cookie and sends the browser on to the SSO logout.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    match &state.settings.cas {
        Some(cas) => (
            StatusCode::FOUND,
            jar.add(logout_cookie(&state.settings.session_cookie)),
            [(header::LOCATION, cas.logout_url())],
        )
            .into_response(),
        None => sso_not_configured(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn jar(cookie: &'static str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn finds_session_cookie_among_others() {
        let jar = jar("theme=dark; connect.sid=s%3Aabc; lang=de");
        assert!(has_session(&jar, "connect.sid"));
        assert!(!has_session(&jar, "sid"));
    }

    #[test]
    fn empty_or_missing_cookie_is_no_session() {
        assert!(!has_session(&CookieJar::new(), "connect.sid"));
        assert!(!has_session(&jar("connect.sid="), "connect.sid"));
    }

    #[test]
    fn logout_cookie_expires_immediately() {
        let c = logout_cookie("connect.sid");
        assert_eq!(c.name(), "connect.sid");
        assert_eq!(c.value(), "");
        assert_eq!(c.path(), Some("/"));
        assert_eq!(c.max_age(), Some(cookie::time::Duration::ZERO));
    }
}

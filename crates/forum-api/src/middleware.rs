use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use forum_crypto::token::token_prefix;
use forum_types::models::Identity;

use crate::auth::{SESSION_COOKIE, removal_cookie};
use crate::error::ApiError;
use crate::rate_limit::client_key;
use crate::state::AppState;

/// Resolve the session cookie into an `Identity` request extension.
///
/// A cookie that no longer maps to a live session is cleared on the way out,
/// unless the handler already set a fresh one.
pub async fn resolve_identity(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let identity = state.identity_for(token.as_deref()).await;
    req.extensions_mut().insert(identity);

    let response = next.run(req).await;

    match token {
        Some(token) if identity == Identity::Anonymous && !sets_session_cookie(&response) => {
            debug!("Clearing stale session cookie {}…", token_prefix(&token));
            (jar.remove(removal_cookie()), response).into_response()
        }
        _ => response,
    }
}

/// Let only resolved users through. Browsers are sent to the login page;
/// script callers get a 401.
pub async fn require_auth(req: Request, next: Next) -> Response {
    let identity = req
        .extensions()
        .get::<Identity>()
        .copied()
        .unwrap_or(Identity::Anonymous);

    if identity == Identity::Anonymous {
        debug!("Unauthenticated request to {}", req.uri().path());
        if wants_json(req.headers()) {
            return ApiError::Unauthenticated.into_response();
        }
        return (StatusCode::FOUND, [(header::LOCATION, "/login")]).into_response();
    }

    next.run(req).await
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => client_key(addr),
        None => {
            warn!("No peer address on request, rate limiting under a shared key");
            "unknown".to_string()
        }
    };

    if let Err(e) = state.check_rate(&key) {
        warn!("Rate limited {} on {}", key, req.uri().path());
        if wants_json(req.headers()) {
            return e.into_response();
        }
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    }

    next.run(req).await
}

/// True for AJAX or JSON-accepting callers.
pub fn wants_json(headers: &HeaderMap) -> bool {
    let ajax = headers
        .get("x-requested-with")
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"XMLHttpRequest"));
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    ajax || accepts_json
}

fn sets_session_cookie(response: &Response) -> bool {
    let prefix = format!("{}=", SESSION_COOKIE);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v: &HeaderValue| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn ajax_header_wants_json() {
        assert!(wants_json(&headers(&[("x-requested-with", "XMLHttpRequest")])));
    }

    #[test]
    fn accept_header_wants_json() {
        assert!(wants_json(&headers(&[("accept", "text/html, application/json;q=0.9")])));
    }

    #[test]
    fn plain_browser_request_does_not() {
        assert!(!wants_json(&headers(&[("accept", "text/html")])));
        assert!(!wants_json(&HeaderMap::new()));
    }
}

use axum::{
    Json, Router,
    http::{HeaderName, HeaderValue, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;
use crate::{auth, middleware, reactions};

/// Build the forum router.
///
/// Credential endpoints and logout are rate limited; reaction toggles and
/// read-only routes are not. Every route sees the resolved `Identity`.
pub fn router(state: AppState) -> Router {
    let rate_limited = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit));

    // require_auth wraps the limiter; anonymous callers are not counted.
    let protected_limited = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .route_layer(from_fn(middleware::require_auth));

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/posts/{id}/reactions", post(reactions::toggle_post_reaction))
        .route("/comments/{id}/reactions", post(reactions::toggle_comment_reaction))
        .route_layer(from_fn(middleware::require_auth));

    let public = Router::new().route("/health", get(health));

    let timeout = state.config.request_timeout;

    Router::new()
        .merge(rate_limited)
        .merge(protected_limited)
        .merge(protected)
        .merge(public)
        .layer(from_fn_with_state(state.clone(), middleware::resolve_identity))
        .layer(security_header(header::X_FRAME_OPTIONS, "DENY"))
        .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(header::REFERRER_POLICY, "strict-origin-when-cross-origin"))
        .layer(security_header(header::X_XSS_PROTECTION, "1; mode=block"))
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

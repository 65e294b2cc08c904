use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use time::OffsetDateTime;

use forum_types::api::{LoginRequest, LoginResponse, MeResponse, RegisterRequest, RegisterResponse};
use forum_types::models::Identity;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_token";

const EMAIL_LEN: std::ops::RangeInclusive<usize> = 5..=50;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=32;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state
        .register(req.email.trim().to_string(), req.username, req.password)
        .await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .authenticate(req.login.trim().to_string(), req.password)
        .await?;

    let cookie = session_cookie(session.token, session.expires_at, state.config.cookie_secure);

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            user_id: session.user_id,
            expires_at: session.expires_at,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.logout(cookie.value()).await?;
    }

    Ok((jar.remove(removal_cookie()), StatusCode::NO_CONTENT))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<MeResponse>, ApiError> {
    let user_id = identity.user_id().ok_or(ApiError::Unauthenticated)?;

    let db = state.db.clone();
    let user = crate::state::run_blocking(move || {
        db.get_user_by_id(&user_id.to_string())?
            .ok_or(ApiError::Unauthenticated)
    })
    .await?;

    Ok(Json(MeResponse {
        user_id,
        username: user.username,
    }))
}

/// Reject registrations the forum would not accept.
pub fn validate_registration(email: &str, username: &str, password: &str) -> Result<(), ApiError> {
    if !EMAIL_LEN.contains(&email.chars().count()) || !is_email_shaped(email) {
        return Err(ApiError::InvalidInput("Invalid email address".into()));
    }

    if !USERNAME_LEN.contains(&username.chars().count())
        || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::InvalidInput(
            "Username must be 3-20 letters, digits or underscores".into(),
        ));
    }

    if !PASSWORD_LEN.contains(&password.chars().count()) {
        return Err(ApiError::InvalidInput(
            "Password must be 6-32 characters".into(),
        ));
    }

    Ok(())
}

// local@domain.tld, no whitespace, one '@'.
fn is_email_shaped(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => {
            !host.is_empty() && tld.len() >= 2 && !domain.starts_with('.') && !domain.contains("..")
        }
        None => false,
    }
}

pub(crate) fn session_cookie(token: String, expires_at: DateTime<Utc>, secure: bool) -> Cookie<'static> {
    let expires = OffsetDateTime::from_unix_timestamp(expires_at.timestamp()).ok();

    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .expires(expires)
        .build()
}

/// Matches the issued cookie's name and path so the browser drops it.
pub(crate) fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

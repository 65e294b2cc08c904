use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use forum_crypto::password::{hash_password, verify_password};
use forum_crypto::token::token_prefix;
use forum_db::{Database, queries};
use forum_types::models::{Identity, Polarity, Session, SubjectKind};

use crate::auth::validate_registration;
use crate::config::Config;
use crate::error::ApiError;
use crate::rate_limit::RateLimiter;
use crate::reactions::{ReactionEngine, ReactionToggle};
use crate::sessions::SessionManager;

pub type AppState = Arc<AppStateInner>;

/// Everything a request needs, built once at startup and shared by `Arc`.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub sessions: SessionManager,
    pub limiter: Arc<RateLimiter>,
    pub reactions: ReactionEngine,
    pub config: Config,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, config: Config) -> Self {
        Self {
            sessions: SessionManager::new(db.clone(), config.session_ttl),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_max_requests,
                config.rate_limit_window,
            )),
            reactions: ReactionEngine::new(db.clone()),
            db,
            config,
        }
    }

    /// Create an account. Returns the new user's id.
    pub async fn register(
        &self,
        email: String,
        username: String,
        password: String,
    ) -> Result<Uuid, ApiError> {
        validate_registration(&email, &username, &password)?;

        let password_hash = run_blocking(move || Ok(hash_password(&password)?)).await?;
        let user_id = Uuid::new_v4();

        let db = self.db.clone();
        let (id, mail, name) = (user_id.to_string(), email, username.clone());
        run_blocking(move || {
            let outcome = db.transaction(|tx| {
                if queries::email_taken(tx, &mail)? {
                    return Ok(Err(ApiError::Conflict("Email already registered".into())));
                }
                if queries::username_taken(tx, &name)? {
                    return Ok(Err(ApiError::Conflict("Username already taken".into())));
                }
                queries::insert_user(tx, &id, &mail, &name, &password_hash)?;
                Ok(Ok(()))
            })?;
            outcome
        })
        .await?;

        info!("Registered user '{}' ({})", username, user_id);
        Ok(user_id)
    }

    /// Check a login (email or username) and password, then open a fresh
    /// session, replacing any the user already had.
    pub async fn authenticate(&self, login: String, password: String) -> Result<Session, ApiError> {
        let db = self.db.clone();
        let sessions = self.sessions.clone();

        let session = run_blocking(move || {
            let credential = db
                .find_credential_by_login(&login)?
                .ok_or(ApiError::InvalidCredentials)?;

            if !verify_password(&credential.password_hash, &password) {
                debug!("Password check failed for user {}", credential.user_id);
                return Err(ApiError::InvalidCredentials);
            }

            let user_id: Uuid = credential.user_id.parse().map_err(|e| {
                ApiError::Internal(format!("corrupt user id '{}': {}", credential.user_id, e))
            })?;
            sessions.create_session(user_id)
        })
        .await?;

        info!("User {} logged in", session.user_id);
        Ok(session)
    }

    /// Resolve a session token to a user id.
    pub async fn resolve_token(&self, token: &str) -> Result<Uuid, ApiError> {
        let sessions = self.sessions.clone();
        let token = token.to_string();
        run_blocking(move || sessions.resolve(&token)).await
    }

    /// Identity for an optional session token. Anything that does not
    /// resolve is `Anonymous`.
    pub async fn identity_for(&self, token: Option<&str>) -> Identity {
        let Some(token) = token else {
            return Identity::Anonymous;
        };

        match self.resolve_token(token).await {
            Ok(user_id) => Identity::User(user_id),
            Err(ApiError::SessionNotFound) => Identity::Anonymous,
            Err(e) => {
                error!("Session lookup for {}… failed: {}", token_prefix(token), e);
                Identity::Anonymous
            }
        }
    }

    /// End the session for `token`. Logging out an already-gone session is
    /// not an error.
    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let sessions = self.sessions.clone();
        let owned = token.to_string();
        match run_blocking(move || sessions.revoke(&owned)).await {
            Ok(()) => {
                debug!("Session {}… revoked", token_prefix(token));
                Ok(())
            }
            Err(ApiError::SessionNotFound) => {
                warn!("Logout for unknown session {}…", token_prefix(token));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn check_rate(&self, client_key: &str) -> Result<(), ApiError> {
        self.limiter.check(client_key)
    }

    pub async fn react(
        &self,
        subject_id: Uuid,
        kind: SubjectKind,
        user: Option<Uuid>,
        polarity: Polarity,
    ) -> Result<ReactionToggle, ApiError> {
        // Skip the blocking hop when there is nobody to react as.
        let user = user.ok_or(ApiError::Unauthenticated)?;
        let reactions = self.reactions.clone();
        run_blocking(move || reactions.toggle(subject_id, kind, Some(user), polarity)).await
    }
}

/// Run blocking store or hashing work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use forum_crypto::token::{generate_session_token, token_digest, token_prefix};
use forum_db::{Database, queries};
use forum_types::models::Session;

use crate::error::ApiError;

/// Issues, resolves and revokes login sessions.
///
/// A user holds at most one session: creating a new one replaces the old one
/// inside a single transaction. Expiry is checked on every `resolve`, so the
/// periodic sweep only reclaims space.
///
/// All methods block on SQLite; call them from `spawn_blocking` when on the
/// async runtime.
#[derive(Clone)]
pub struct SessionManager {
    db: Arc<Database>,
    ttl: TimeDelta,
}

impl SessionManager {
    pub fn new(db: Arc<Database>, ttl: TimeDelta) -> Self {
        Self { db, ttl }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn create_session(&self, user_id: Uuid) -> Result<Session, ApiError> {
        let token = generate_session_token();
        let digest = token_digest(&token);
        let expires_at = Utc::now() + self.ttl;
        let uid = user_id.to_string();

        let replaced = self.db.transaction(|tx| {
            let replaced = queries::delete_sessions_for_user(tx, &uid)?;
            queries::insert_session(tx, &digest, &uid, expires_at.timestamp_millis())?;
            Ok(replaced)
        })?;

        if replaced > 0 {
            debug!("Replaced {} existing session(s) for user {}", replaced, user_id);
        }

        Ok(Session {
            token,
            user_id,
            expires_at,
        })
    }

    /// Map a token to its user. Absent, expired and revoked tokens all
    /// surface as `SessionNotFound`; an expired row is deleted on the spot.
    pub fn resolve(&self, token: &str) -> Result<Uuid, ApiError> {
        let digest = token_digest(token);

        let row = self
            .db
            .with_conn(|conn| queries::find_session(conn, &digest))?
            .ok_or(ApiError::SessionNotFound)?;

        if Utc::now().timestamp_millis() > row.expires_at {
            self.db
                .with_conn_mut(|conn| queries::delete_session_by_token(conn, &digest))?;
            debug!("Session {}… expired, removed", token_prefix(token));
            return Err(ApiError::SessionNotFound);
        }

        row.user_id.parse().map_err(|e| {
            warn!("Corrupt user_id '{}' on session: {}", row.user_id, e);
            ApiError::SessionNotFound
        })
    }

    /// Delete the session for `token`. `SessionNotFound` tells the caller
    /// nothing was there to delete.
    pub fn revoke(&self, token: &str) -> Result<(), ApiError> {
        let digest = token_digest(token);
        let removed = self
            .db
            .with_conn_mut(|conn| queries::delete_session_by_token(conn, &digest))?;

        if removed == 0 {
            return Err(ApiError::SessionNotFound);
        }
        Ok(())
    }

    /// Bulk-delete every expired session. Returns how many rows went.
    pub fn sweep_expired(&self) -> Result<usize, ApiError> {
        self.sweep_expired_at(Utc::now())
    }

    fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize, ApiError> {
        let removed = self
            .db
            .with_conn_mut(|conn| queries::delete_expired_sessions(conn, now.timestamp_millis()))?;
        Ok(removed)
    }

    pub fn count_for_user(&self, user_id: Uuid) -> Result<u64, ApiError> {
        Ok(self.db.count_sessions_for_user(&user_id.to_string())?)
    }
}

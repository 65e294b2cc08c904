use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use forum_db::{Database, is_foreign_key_violation, queries};
use forum_types::api::{ToggleReactionRequest, ToggleReactionResponse};
use forum_types::models::{Identity, Polarity, ReactionCounts, SubjectKind};
use forum_types::reactions::{ReactionState, transition};

use crate::error::ApiError;
use crate::state::AppState;

/// Result of a toggle: the caller's new state and the subject's totals
/// re-read after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionToggle {
    pub state: ReactionState,
    pub counts: ReactionCounts,
}

/// Applies like/dislike toggles so that a user never holds more than one
/// reaction per subject.
///
/// The read-decide-write runs in one immediate transaction; the unique index
/// on (subject, user) backs it up. Methods block on SQLite.
#[derive(Clone)]
pub struct ReactionEngine {
    db: Arc<Database>,
}

impl ReactionEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn toggle(
        &self,
        subject_id: Uuid,
        kind: SubjectKind,
        user: Option<Uuid>,
        requested: Polarity,
    ) -> Result<ReactionToggle, ApiError> {
        let user_id = user.ok_or(ApiError::Unauthenticated)?;
        let sid = subject_id.to_string();
        let uid = user_id.to_string();

        let outcome = self.db.transaction(|tx| {
            if !queries::subject_exists(tx, kind, &sid)? {
                return Ok(None);
            }

            let current = ReactionState::from_polarity(queries::find_reaction(tx, kind, &sid, &uid)?);
            let next = transition(current, requested);

            match (current.polarity(), next.polarity()) {
                (None, Some(p)) => queries::insert_reaction(tx, kind, &sid, &uid, p)?,
                (Some(_), Some(p)) => {
                    queries::update_reaction_polarity(tx, kind, &sid, &uid, p)?;
                }
                (Some(_), None) => {
                    queries::delete_reaction(tx, kind, &sid, &uid)?;
                }
                (None, None) => {}
            }

            Ok(Some(next))
        });

        let state = match outcome {
            Ok(Some(state)) => state,
            Ok(None) => return Err(ApiError::NotFound),
            // Subject deleted between the existence check and the write.
            Err(e) if is_foreign_key_violation(&e) => return Err(ApiError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let counts = self.db.count_reactions(kind, &sid)?;
        debug!(
            "Reaction {} on {} {} by {}: now {:?} ({} likes / {} dislikes)",
            requested, kind, subject_id, user_id, state, counts.likes, counts.dislikes
        );

        Ok(ReactionToggle { state, counts })
    }
}

pub async fn toggle_post_reaction(
    state: State<AppState>,
    path: Path<Uuid>,
    identity: Extension<Identity>,
    req: Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    toggle(state, path, identity, req, SubjectKind::Post).await
}

pub async fn toggle_comment_reaction(
    state: State<AppState>,
    path: Path<Uuid>,
    identity: Extension<Identity>,
    req: Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    toggle(state, path, identity, req, SubjectKind::Comment).await
}

async fn toggle(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ToggleReactionRequest>,
    kind: SubjectKind,
) -> Result<Json<ToggleReactionResponse>, ApiError> {
    let outcome = state
        .react(subject_id, kind, identity.user_id(), req.polarity)
        .await?;

    Ok(Json(ToggleReactionResponse {
        likes: outcome.counts.likes,
        dislikes: outcome.counts.dislikes,
        state: outcome.state,
    }))
}

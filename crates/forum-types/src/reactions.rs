use serde::{Deserialize, Serialize};

use crate::models::Polarity;

/// The reaction a single user holds on a single subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionState {
    None,
    Liked,
    Disliked,
}

impl ReactionState {
    pub fn from_polarity(polarity: Option<Polarity>) -> Self {
        match polarity {
            None => Self::None,
            Some(Polarity::Like) => Self::Liked,
            Some(Polarity::Dislike) => Self::Disliked,
        }
    }

    pub fn polarity(&self) -> Option<Polarity> {
        match self {
            Self::None => None,
            Self::Liked => Some(Polarity::Like),
            Self::Disliked => Some(Polarity::Dislike),
        }
    }
}

/// Next state after a user asks for `requested` while holding `current`.
/// Asking for the polarity you already hold clears it; anything else
/// switches to the requested polarity.
pub fn transition(current: ReactionState, requested: Polarity) -> ReactionState {
    match (current, requested) {
        (ReactionState::Liked, Polarity::Like) => ReactionState::None,
        (ReactionState::Disliked, Polarity::Dislike) => ReactionState::None,
        (_, Polarity::Like) => ReactionState::Liked,
        (_, Polarity::Dislike) => ReactionState::Disliked,
    }
}

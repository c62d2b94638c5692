//! Session identity used to key every per-session cache.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::events::Message;

/// Immutable identity of one live or replayed session.
///
/// Equality depends on whether the session belongs to an experiment:
/// - without an experiment id, the identity is `(session_id, username, playback_id)`
/// - with one, the identity is `(experiment_id, user_id, playback_id)`
///
/// Keys that differ in experiment-id presence are never equal. The playback
/// id keeps concurrent replays of the same underlying session apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionKey {
    session_id: i32,
    user_id: i32,
    experiment_id: Option<String>,
    username: Option<String>,
    playback_id: Option<String>,
}

impl SessionKey {
    /// Key for a live, non-experiment session.
    #[must_use]
    pub fn new(session_id: i32, user_id: i32, username: Option<String>) -> Self {
        Self {
            session_id,
            user_id,
            experiment_id: None,
            username,
            playback_id: None,
        }
    }

    /// Key for an experiment session.
    #[must_use]
    pub fn for_experiment(experiment_id: impl Into<String>, session_id: i32, user_id: i32) -> Self {
        Self {
            session_id,
            user_id,
            experiment_id: Some(experiment_id.into()),
            username: None,
            playback_id: None,
        }
    }

    /// Derive the key of the session a message belongs to.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            session_id: message.session_id,
            user_id: message.user_id,
            experiment_id: message.experiment_id.clone(),
            username: message.username.clone(),
            playback_id: message.playback_id.clone(),
        }
    }

    /// The same session viewed through a particular replay.
    #[must_use]
    pub fn with_playback(mut self, playback_id: impl Into<String>) -> Self {
        self.playback_id = Some(playback_id.into());
        self
    }

    #[must_use]
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    #[must_use]
    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    #[must_use]
    pub fn experiment_id(&self) -> Option<&str> {
        self.experiment_id.as_deref()
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn playback_id(&self) -> Option<&str> {
        self.playback_id.as_deref()
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.experiment_id, &other.experiment_id) {
            (None, None) => {
                self.session_id == other.session_id
                    && self.username == other.username
                    && self.playback_id == other.playback_id
            }
            (Some(a), Some(b)) => {
                a == b && self.user_id == other.user_id && self.playback_id == other.playback_id
            }
            _ => false,
        }
    }
}

impl Eq for SessionKey {}

impl Hash for SessionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.experiment_id {
            None => {
                0u8.hash(state);
                self.session_id.hash(state);
                self.username.hash(state);
            }
            Some(experiment_id) => {
                1u8.hash(state);
                experiment_id.hash(state);
                self.user_id.hash(state);
            }
        }
        self.playback_id.hash(state);
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.experiment_id {
            None => write!(
                f,
                "session {} ({})",
                self.session_id,
                self.username.as_deref().unwrap_or("anonymous")
            )?,
            Some(experiment_id) => write!(f, "experiment {} user {}", experiment_id, self.user_id)?,
        }
        if let Some(playback_id) = &self.playback_id {
            write!(f, " playback {}", playback_id)?;
        }
        Ok(())
    }
}

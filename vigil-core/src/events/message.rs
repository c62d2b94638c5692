//! Session telemetry messages as delivered by the transport.

use serde::{Deserialize, Serialize};

use super::performance::LearnerState;

/// Enumerated message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// State snapshot of the assessed hierarchy.
    LearnerState,
    InitializePedagogicalModelRequest,
    PedagogicalRequest,
    LessonStarted,
    LessonCompleted,
    KnowledgeSessionUpdate,
    EntityState,
}

impl MessageType {
    /// The designated state-snapshot type that drives task timers.
    pub const STATE_SNAPSHOT: MessageType = MessageType::LearnerState;

    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LearnerState => "learner_state",
            Self::InitializePedagogicalModelRequest => "initialize_pedagogical_model_request",
            Self::PedagogicalRequest => "pedagogical_request",
            Self::LessonStarted => "lesson_started",
            Self::LessonCompleted => "lesson_completed",
            Self::KnowledgeSessionUpdate => "knowledge_session_update",
            Self::EntityState => "entity_state",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of process that sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    /// The module that owns the session's domain state.
    Domain,
    Learner,
    Pedagogical,
    Gateway,
    #[default]
    Other,
}

/// User session descriptor attached to domain session messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: i32,
    pub username: Option<String>,
    pub experiment_id: Option<String>,
}

impl UserSession {
    #[must_use]
    pub fn new(user_id: i32) -> Self {
        Self {
            user_id,
            username: None,
            experiment_id: None,
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// High-frequency entity update (position etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub active: bool,
    pub location: [f64; 3],
}

/// Typed message payload; the message type is derived from the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    LearnerState(LearnerState),
    InitializePedagogicalModelRequest(serde_json::Value),
    PedagogicalRequest(serde_json::Value),
    LessonStarted,
    LessonCompleted,
    KnowledgeSessionUpdate(serde_json::Value),
    EntityState(EntityState),
}

impl Payload {
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::LearnerState(_) => MessageType::LearnerState,
            Self::InitializePedagogicalModelRequest(_) => {
                MessageType::InitializePedagogicalModelRequest
            }
            Self::PedagogicalRequest(_) => MessageType::PedagogicalRequest,
            Self::LessonStarted => MessageType::LessonStarted,
            Self::LessonCompleted => MessageType::LessonCompleted,
            Self::KnowledgeSessionUpdate(_) => MessageType::KnowledgeSessionUpdate,
            Self::EntityState(_) => MessageType::EntityState,
        }
    }

    /// The learner state, if this is a state snapshot.
    #[must_use]
    pub fn as_learner_state(&self) -> Option<&LearnerState> {
        match self {
            Self::LearnerState(state) => Some(state),
            _ => None,
        }
    }
}

/// A timestamped session event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Id assigned by the sender; `None` when the sender could not supply one.
    pub source_event_id: Option<u64>,
    pub sender_address: String,
    #[serde(default)]
    pub sender_module: ModuleType,
    pub session_id: i32,
    pub user_id: i32,
    pub experiment_id: Option<String>,
    pub username: Option<String>,
    pub playback_id: Option<String>,
    pub user_session: Option<UserSession>,
    /// Epoch millis.
    pub timestamp: i64,
    pub payload: Payload,
}

impl Message {
    /// Create a message with no event id and no identity beyond the session id.
    #[must_use]
    pub fn new(
        session_id: i32,
        sender_address: impl Into<String>,
        timestamp: i64,
        payload: Payload,
    ) -> Self {
        Self {
            source_event_id: None,
            sender_address: sender_address.into(),
            sender_module: ModuleType::Other,
            session_id,
            user_id: 0,
            experiment_id: None,
            username: None,
            playback_id: None,
            user_session: None,
            timestamp,
            payload,
        }
    }

    #[must_use]
    pub fn with_event_id(mut self, id: u64) -> Self {
        self.source_event_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_sender_module(mut self, module: ModuleType) -> Self {
        self.sender_module = module;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: i32, username: impl Into<String>) -> Self {
        self.user_id = user_id;
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_experiment(mut self, experiment_id: impl Into<String>) -> Self {
        self.experiment_id = Some(experiment_id.into());
        self
    }

    #[must_use]
    pub fn with_playback(mut self, playback_id: impl Into<String>) -> Self {
        self.playback_id = Some(playback_id.into());
        self
    }

    #[must_use]
    pub fn with_user_session(mut self, session: UserSession) -> Self {
        self.user_session = Some(session);
        self
    }

    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}

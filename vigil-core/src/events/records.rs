//! Side-cache records kept per session for late-joining observers.

use serde::{Deserialize, Serialize};

/// A pedagogical strategy that was carried out during the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedStrategy {
    pub strategy_name: String,
    /// Epoch millis at which the strategy was performed.
    pub time_performed: i64,
    pub evaluator: Option<String>,
    #[serde(default)]
    pub applied: bool,
}

impl ProcessedStrategy {
    #[must_use]
    pub fn new(strategy_name: impl Into<String>, time_performed: i64) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            time_performed,
            evaluator: None,
            applied: true,
        }
    }
}

/// An observer bookmark attached to a moment in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedBookmark {
    /// Epoch millis the bookmark refers to.
    pub timestamp: i64,
    pub comment: Option<String>,
    pub media: Option<String>,
    pub evaluator: Option<String>,
}

impl ProcessedBookmark {
    #[must_use]
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            comment: None,
            media: None,
            evaluator: None,
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

//! Evaluator-initiated edits to a single performance node.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vigil_core::AssessmentLevel;

/// A manual assessment change made by an observer/evaluator.
///
/// Targets a node by name. Every metric is optional; only the supplied ones
/// are changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorUpdate {
    pub node_name: String,
    /// Epoch millis of the observation.
    pub timestamp: i64,
    pub level: Option<AssessmentLevel>,
    pub competence: Option<f32>,
    pub confidence: Option<f32>,
    pub priority: Option<u32>,
    pub trend: Option<f32>,
    pub assessment_hold: Option<bool>,
    pub competence_hold: Option<bool>,
    pub confidence_hold: Option<bool>,
    pub priority_hold: Option<bool>,
    pub trend_hold: Option<bool>,
    /// Observer comment explaining the change.
    pub reason: Option<String>,
    pub media: Option<String>,
    pub evaluator: Option<String>,
    /// Levels for specific team members; empty means the whole node.
    #[serde(default)]
    pub team_org_entities: BTreeMap<String, AssessmentLevel>,
}

impl EvaluatorUpdate {
    #[must_use]
    pub fn new(node_name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            node_name: node_name.into(),
            timestamp,
            level: None,
            competence: None,
            confidence: None,
            priority: None,
            trend: None,
            assessment_hold: None,
            competence_hold: None,
            confidence_hold: None,
            priority_hold: None,
            trend_hold: None,
            reason: None,
            media: None,
            evaluator: None,
            team_org_entities: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: AssessmentLevel) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl Into<String>) -> Self {
        self.evaluator = Some(evaluator.into());
        self
    }

    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>, level: AssessmentLevel) -> Self {
        self.team_org_entities.insert(entity.into(), level);
        self
    }

    #[must_use]
    pub fn with_assessment_hold(mut self, hold: bool) -> Self {
        self.assessment_hold = Some(hold);
        self
    }

    #[must_use]
    pub fn with_competence(mut self, competence: f32) -> Self {
        self.competence = Some(competence);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }
}

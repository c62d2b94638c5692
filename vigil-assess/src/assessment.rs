//! Mutable assessment carried by each node of the tree.

use std::collections::BTreeMap;

use vigil_core::{ActivityState, AssessmentLevel, PerformanceStateAttribute};

use crate::update::EvaluatorUpdate;

/// Live assessment of one performance node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assessment {
    pub level: AssessmentLevel,
    pub competence: f32,
    pub confidence: f32,
    pub priority: Option<u32>,
    pub trend: f32,
    pub assessment_hold: bool,
    pub competence_hold: bool,
    pub confidence_hold: bool,
    pub priority_hold: bool,
    pub trend_hold: bool,
    pub observer_comment: Option<String>,
    pub observer_media: Option<String>,
    pub evaluator: Option<String>,
    pub assessed_team_org_entities: BTreeMap<String, AssessmentLevel>,
    pub node_state: ActivityState,
    /// Epoch millis of the last observation.
    pub time: Option<i64>,
}

impl Assessment {
    /// Set the level, broadcasting it to every tracked entity.
    fn set_level_everywhere(&mut self, level: AssessmentLevel) {
        self.level = level;
        for entity_level in self.assessed_team_org_entities.values_mut() {
            *entity_level = level;
        }
    }

    /// Overwrite this assessment with an externally observed state.
    pub fn load_from(&mut self, state: &PerformanceStateAttribute) {
        if state.assessed_team_org_entities.is_empty() {
            self.set_level_everywhere(state.short_term);
        } else {
            self.assessed_team_org_entities = state.assessed_team_org_entities.clone();
            self.level = state.short_term;
        }

        self.observer_comment = state.observer_comment.clone();
        self.observer_media = state.observer_media.clone();
        self.evaluator = state.evaluator.clone();
        self.competence = state.competence;
        self.confidence = state.confidence;
        self.priority = state.priority;
        self.trend = state.trend;
        self.assessment_hold = state.assessment_hold;
        self.competence_hold = state.competence_hold;
        self.confidence_hold = state.confidence_hold;
        self.priority_hold = state.priority_hold;
        self.trend_hold = state.trend_hold;
        self.node_state = state.node_state;
        self.time = state.assessment_time;
    }

    /// Apply the metrics an evaluator supplied.
    ///
    /// With no per-entity levels in the update, a new level applies to every
    /// entity already tracked by this node.
    pub fn apply_update(&mut self, update: &EvaluatorUpdate) {
        let has_entities = !update.team_org_entities.is_empty();
        if has_entities {
            self.assessed_team_org_entities.extend(
                update
                    .team_org_entities
                    .iter()
                    .map(|(entity, level)| (entity.clone(), *level)),
            );
        }

        if let Some(level) = update.level {
            if has_entities {
                self.level = level;
            } else {
                self.set_level_everywhere(level);
            }
        }

        self.observer_comment = update.reason.clone();
        self.observer_media = update.media.clone();
        self.time = Some(update.timestamp);

        if let Some(competence) = update.competence {
            self.competence = competence;
        }
        if let Some(confidence) = update.confidence {
            self.confidence = confidence;
        }
        if let Some(priority) = update.priority {
            self.priority = Some(priority);
        }
        if let Some(trend) = update.trend {
            self.trend = trend;
        }
        if let Some(evaluator) = &update.evaluator {
            self.evaluator = Some(evaluator.clone());
        }

        if let Some(hold) = update.assessment_hold {
            self.assessment_hold = hold;
        }
        if let Some(hold) = update.competence_hold {
            self.competence_hold = hold;
        }
        if let Some(hold) = update.confidence_hold {
            self.confidence_hold = hold;
        }
        if let Some(hold) = update.priority_hold {
            self.priority_hold = hold;
        }
        if let Some(hold) = update.trend_hold {
            self.trend_hold = hold;
        }
    }

    /// Copy this assessment over a performance state attribute.
    ///
    /// Entities in `state` without an explicit level here inherit the scalar
    /// level. The explanation becomes the observer comment when there is one,
    /// otherwise a note naming the assessed entities.
    pub fn write_into(&self, state: &mut PerformanceStateAttribute) {
        let has_entities = !self.assessed_team_org_entities.is_empty();
        if has_entities {
            state.assessed_team_org_entities = self.assessed_team_org_entities.clone();
        }

        state.short_term = self.level;
        if !has_entities {
            for entity_level in state.assessed_team_org_entities.values_mut() {
                *entity_level = self.level;
            }
        }

        state.observer_comment = self.observer_comment.clone();
        state.observer_media = self.observer_media.clone();
        state.competence = self.competence;
        state.confidence = self.confidence;
        state.priority = self.priority;
        state.trend = self.trend;
        if let Some(evaluator) = &self.evaluator {
            state.evaluator = Some(evaluator.clone());
        }

        state.assessment_hold = self.assessment_hold;
        state.competence_hold = self.competence_hold;
        state.confidence_hold = self.confidence_hold;
        state.priority_hold = self.priority_hold;
        state.trend_hold = self.trend_hold;
        state.node_state = self.node_state;
        state.assessment_time = self.time;

        let comment = self
            .observer_comment
            .as_deref()
            .filter(|c| !c.trim().is_empty());
        if let Some(comment) = comment {
            state.assessment_explanation = [comment.to_string()].into_iter().collect();
        } else if has_entities {
            let names: Vec<&str> = self
                .assessed_team_org_entities
                .keys()
                .map(String::as_str)
                .collect();
            let verb = if names.len() == 1 { "has" } else { "have" };
            let explanation = format!("[{}] {} been assessed.", names.join(", "), verb);
            state.assessment_explanation = [explanation].into_iter().collect();
        }
    }
}

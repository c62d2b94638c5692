//! Grading capability attached to each performance node.

use std::collections::HashMap;
use std::fmt;

use vigil_core::{AssessmentLevel, NodeId};

use crate::assessment::Assessment;
use crate::update::EvaluatorUpdate;

const ABOVE_EXPECTATION_SCORE: f64 = 4.0;
const AT_EXPECTATION_SCORE: f64 = 2.0;
const BELOW_EXPECTATION_SCORE: f64 = 0.0;

const BELOW_EXPECTATION_UPPER_THRESHOLD: f64 = 2.0;
const AT_EXPECTATION_UPPER_THRESHOLD: f64 = 3.33;

/// Smallest weight a child can be authored with.
const MIN_WEIGHT: f64 = 0.01;

/// A child's level as seen by its parent's metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildLevel {
    pub node_id: NodeId,
    pub level: AssessmentLevel,
}

/// Decides how a node's own assessment changes.
///
/// Each node in an [`AssessmentTree`](crate::AssessmentTree) owns one. The
/// rollup engine calls [`apply_update`](Self::apply_update) on the node an
/// evaluator edited and [`roll_up`](Self::roll_up) on each of its ancestors.
pub trait PerformanceMetric: Send + Sync + fmt::Debug {
    /// Apply an evaluator edit to the node's own assessment.
    fn apply_update(&self, assessment: &mut Assessment, update: &EvaluatorUpdate) {
        assessment.apply_update(update);
    }

    /// Derive a node's level from its children's levels.
    ///
    /// `None` leaves the node's level unchanged.
    fn roll_up(&self, children: &[ChildLevel]) -> Option<AssessmentLevel>;
}

/// Round to two decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Turn an aggregate score into a level.
///
/// `weight_to_consider` is the share of weight contributed by children with a
/// known level; below 1% nothing is known and the result is `Unknown`.
#[must_use]
pub fn level_from_score(weight_to_consider: f64, aggregate_score: f64) -> AssessmentLevel {
    let weight = round2(weight_to_consider);
    let score = round2(aggregate_score);

    if weight < MIN_WEIGHT {
        return AssessmentLevel::Unknown;
    }

    let normalized = score / weight;
    if normalized < BELOW_EXPECTATION_UPPER_THRESHOLD {
        AssessmentLevel::BelowExpectation
    } else if normalized >= AT_EXPECTATION_UPPER_THRESHOLD {
        AssessmentLevel::AboveExpectation
    } else {
        AssessmentLevel::AtExpectation
    }
}

/// Score weighted levels: Above=4, At=2, Below=0, Unknown drops out.
#[must_use]
pub fn score_levels(levels: impl IntoIterator<Item = (AssessmentLevel, f64)>) -> AssessmentLevel {
    let mut aggregate = 0.0;
    let mut weight_to_consider = 1.0;

    for (level, weight) in levels {
        match level {
            AssessmentLevel::AboveExpectation => aggregate += ABOVE_EXPECTATION_SCORE * weight,
            AssessmentLevel::AtExpectation => aggregate += AT_EXPECTATION_SCORE * weight,
            AssessmentLevel::BelowExpectation => aggregate += BELOW_EXPECTATION_SCORE * weight,
            AssessmentLevel::Unknown => weight_to_consider -= weight,
        }
    }

    level_from_score(weight_to_consider, aggregate)
}

/// Default metric: weighted average of the children's levels.
///
/// Weights only apply when every child has one; otherwise all children weigh
/// the same.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedPerformanceMetric {
    weights: HashMap<NodeId, f64>,
}

impl WeightedPerformanceMetric {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight of one child node.
    #[must_use]
    pub fn with_weight(mut self, child: NodeId, weight: f64) -> Self {
        self.weights.insert(child, weight);
        self
    }

    #[must_use]
    pub fn weight(&self, child: NodeId) -> Option<f64> {
        self.weights.get(&child).copied()
    }
}

impl PerformanceMetric for WeightedPerformanceMetric {
    fn roll_up(&self, children: &[ChildLevel]) -> Option<AssessmentLevel> {
        if children.is_empty() {
            return None;
        }

        let using_weights = children
            .iter()
            .all(|c| self.weights.contains_key(&c.node_id));
        let even_weight = 1.0 / children.len() as f64;

        let level = score_levels(children.iter().map(|child| {
            let weight = if using_weights {
                self.weight(child.node_id).unwrap_or(even_weight)
            } else {
                even_weight
            };
            (child.level, weight)
        }));
        Some(level)
    }
}

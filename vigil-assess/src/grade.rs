//! Scoring policy used when an overall assessment is recomputed.

use std::collections::HashMap;
use std::fmt;

use vigil_core::NodeId;

use crate::score::{GradedScoreNode, ScoreNode, ScoreNodeUpdate};
use crate::tree::{AssessmentTree, NodeKind};

/// Inputs shared by every task scored in one pass.
#[derive(Debug, Clone, Copy)]
pub struct GradeInputs<'a> {
    /// Observer condition assessments, by leaf concept id.
    pub updates: &'a HashMap<NodeId, Vec<ScoreNodeUpdate>>,
    /// Leaf-concept scores from the previous overall assessment.
    pub existing: &'a HashMap<NodeId, GradedScoreNode>,
}

/// Builds the score subtree of one task.
pub trait GradeMetric: Send + Sync + fmt::Debug {
    /// Score `task`, or `None` when nothing under it has been scored.
    ///
    /// Grades in the returned tree need not be final; the engine rolls the
    /// whole tree up afterwards.
    fn score_task(
        &self,
        tree: &AssessmentTree,
        task: NodeId,
        inputs: GradeInputs<'_>,
    ) -> Result<Option<GradedScoreNode>, String>;
}

/// Scores tasks from observer condition assessments.
///
/// A leaf concept with supplied updates gets a fresh score made of one raw
/// score per update; otherwise its previous score is reused. Concepts with
/// neither, and composites left with no scored children, are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObserverGradeMetric;

impl ObserverGradeMetric {
    fn score_node(
        &self,
        tree: &AssessmentTree,
        id: NodeId,
        inputs: GradeInputs<'_>,
    ) -> Option<GradedScoreNode> {
        let node = tree.node(id)?;

        if node.kind == NodeKind::Concept {
            let Some(updates) = inputs.updates.get(&id).filter(|u| !u.is_empty()) else {
                return inputs.existing.get(&id).cloned();
            };
            let score = GradedScoreNode::for_node(id, &node.name);
            let fresh = updates
                .iter()
                .map(|update| ScoreNode::Raw(update.to_raw()))
                .fold(score, GradedScoreNode::with_child);
            return Some(fresh);
        }

        let children: Vec<ScoreNode> = node
            .children
            .iter()
            .filter_map(|child| self.score_node(tree, *child, inputs))
            .map(ScoreNode::Graded)
            .collect();

        if children.is_empty() {
            return None;
        }
        Some(GradedScoreNode {
            children,
            ..GradedScoreNode::for_node(id, &node.name)
        })
    }
}

impl GradeMetric for ObserverGradeMetric {
    fn score_task(
        &self,
        tree: &AssessmentTree,
        task: NodeId,
        inputs: GradeInputs<'_>,
    ) -> Result<Option<GradedScoreNode>, String> {
        match tree.node(task) {
            Some(node) if node.kind == NodeKind::Task => Ok(self.score_node(tree, task, inputs)),
            Some(_) => Err(format!("node {task} is not a task")),
            None => Err(format!("no task with id {task}")),
        }
    }
}

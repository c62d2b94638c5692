//! Applies evaluator edits to the tree and rolls assessments up.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use vigil_core::{
    AssessmentLevel, ConceptPerformanceState, NodeId, PerformanceState, PerformanceStateAttribute,
};

use crate::error::{AssessError, Result};
use crate::grade::{GradeInputs, GradeMetric, ObserverGradeMetric};
use crate::metric::ChildLevel;
use crate::score::{self, GradedScoreNode, ScoreNodeUpdate};
use crate::tree::{AssessmentTree, NodeKind};
use crate::update::EvaluatorUpdate;

/// Keeps an [`AssessmentTree`] in step with observed performance state.
///
/// Holds the tree, the performance state attribute last pushed into each
/// node, and the overall score the host considers current. Callers serialize
/// access per session; the engine has no internal locking.
#[derive(Debug)]
pub struct RollupEngine {
    tree: AssessmentTree,
    last_pushed: HashMap<NodeId, PerformanceStateAttribute>,
    current_score: Option<GradedScoreNode>,
    grade_metric: Arc<dyn GradeMetric>,
}

impl RollupEngine {
    /// Create an engine scoring with [`ObserverGradeMetric`].
    #[must_use]
    pub fn new(tree: AssessmentTree) -> Self {
        Self {
            tree,
            last_pushed: HashMap::new(),
            current_score: None,
            grade_metric: Arc::new(ObserverGradeMetric),
        }
    }

    #[must_use]
    pub fn with_grade_metric(mut self, grade_metric: Arc<dyn GradeMetric>) -> Self {
        self.grade_metric = grade_metric;
        self
    }

    #[must_use]
    pub fn tree(&self) -> &AssessmentTree {
        &self.tree
    }

    /// State last pushed into a node by [`apply_and_roll_up`](Self::apply_and_roll_up).
    #[must_use]
    pub fn last_pushed(&self, id: NodeId) -> Option<&PerformanceStateAttribute> {
        self.last_pushed.get(&id)
    }

    #[must_use]
    pub fn current_score(&self) -> Option<&GradedScoreNode> {
        self.current_score.as_ref()
    }

    /// Set the overall score later scoring passes start from.
    pub fn set_current_score(&mut self, score: Option<GradedScoreNode>) {
        self.current_score = score;
    }

    // === Evaluator edits ===

    /// Apply an evaluator edit and roll it up to the containing task.
    ///
    /// The tree is first loaded from `state` so the edit applies against what
    /// was last observed. Returns one updated attribute per changed node,
    /// starting with the edited node and ending with its task. An update
    /// naming no node in `state` changes nothing.
    pub fn apply_and_roll_up(
        &mut self,
        update: &EvaluatorUpdate,
        state: &PerformanceState,
    ) -> Result<Vec<PerformanceStateAttribute>> {
        self.push_state(state)?;

        let Some(path) = find_path(state, &update.node_name) else {
            tracing::debug!(node = %update.node_name, "Evaluator update matched no node");
            return Ok(Vec::new());
        };

        let target = path[0];
        {
            let node = self
                .tree
                .node_mut(target)
                .ok_or(AssessError::UnknownNode(target))?;
            let metric = Arc::clone(&node.metric);
            metric.apply_update(&mut node.assessment, update);
        }
        for &ancestor in &path[1..] {
            self.roll_up_node(ancestor)?;
        }
        let changed = path.len();
        tracing::info!(node_id = target, changed, "Applied evaluator update");

        path.iter()
            .map(|id| {
                let node = self.tree.node(*id).ok_or(AssessError::UnknownNode(*id))?;
                let mut attribute = self
                    .last_pushed
                    .get(id)
                    .cloned()
                    .ok_or(AssessError::UnknownNode(*id))?;
                node.assessment.write_into(&mut attribute);
                Ok(attribute)
            })
            .collect()
    }

    /// Recompute a node's level from its children unless its level is held.
    fn roll_up_node(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.node(id).ok_or(AssessError::UnknownNode(id))?;
        if node.assessment.assessment_hold {
            tracing::trace!(node_id = id, "Assessment held, skipping rollup");
            return Ok(());
        }

        let children: Vec<ChildLevel> = node
            .children
            .iter()
            .filter_map(|child| self.tree.node(*child))
            .map(|child| ChildLevel {
                node_id: child.id,
                level: child.assessment.level,
            })
            .collect();

        if let Some(level) = node.metric.roll_up(&children) {
            tracing::debug!(node_id = id, %level, "Rolled up assessment");
            if let Some(node) = self.tree.node_mut(id) {
                node.assessment.level = level;
            }
        }
        Ok(())
    }

    /// Load every node present in `state` into the tree.
    fn push_state(&mut self, state: &PerformanceState) -> Result<()> {
        self.last_pushed.clear();
        for task in state.tasks.values() {
            self.push_attribute(&task.state, "task", |kind| kind == NodeKind::Task)?;
            for concept in &task.concepts {
                self.push_concept(concept)?;
            }
        }
        Ok(())
    }

    fn push_concept(&mut self, concept: &ConceptPerformanceState) -> Result<()> {
        self.push_attribute(&concept.state, "concept", |kind| kind.is_concept())?;
        for child in &concept.concepts {
            self.push_concept(child)?;
        }
        Ok(())
    }

    fn push_attribute(
        &mut self,
        attribute: &PerformanceStateAttribute,
        expected: &'static str,
        accept: impl Fn(NodeKind) -> bool,
    ) -> Result<()> {
        let id = attribute.node_id;
        let node = self.tree.expect_node(id, expected, accept)?;
        node.assessment.load_from(attribute);
        self.last_pushed.insert(id, attribute.clone());
        Ok(())
    }

    // === Overall scoring ===

    /// Recompute the overall score after observer condition assessments.
    ///
    /// Only tasks containing one of the updated concepts are rescored; the
    /// rest keep their score from the current overall score. The current
    /// score itself is never modified. Returns `None` when no task has a
    /// score yet.
    pub fn score_overall_assessments(
        &self,
        updates: &HashMap<NodeId, Vec<ScoreNodeUpdate>>,
        course_concepts: &[String],
    ) -> Result<Option<GradedScoreNode>> {
        let mut root = self
            .current_score
            .clone()
            .unwrap_or_else(|| GradedScoreNode::root(self.tree.scenario_name()));

        let existing = score::leaf_concept_scores(&root);
        let inputs = GradeInputs {
            updates,
            existing: &existing,
        };
        let dirty = |id: NodeId| updates.contains_key(&id);

        for &task in self.tree.tasks() {
            let affected = self
                .tree
                .children(task)
                .iter()
                .any(|concept| self.tree.contains_any(*concept, &dirty));
            if !affected {
                continue;
            }

            let scored = self
                .grade_metric
                .score_task(&self.tree, task, inputs)
                .map_err(|reason| {
                    let name = self.tree.node(task).map(|n| n.name.clone());
                    AssessError::Grading {
                        task: name.unwrap_or_default(),
                        reason,
                    }
                })?;

            if let Some(mut child) = scored {
                child.mark_course_concepts(course_concepts);
                root.upsert_child(child);
            }
        }

        if root.is_leaf() {
            tracing::debug!("No scoring information available yet");
            return Ok(None);
        }

        score::perform_assessment_rollup(&mut root);
        Ok(Some(root))
    }

    /// Level of every scored node after applying observer assessments.
    pub fn calculate_roll_up(
        &self,
        updates: &HashMap<NodeId, Vec<ScoreNodeUpdate>>,
        course_concepts: &[String],
    ) -> Result<BTreeMap<NodeId, AssessmentLevel>> {
        Ok(self
            .score_overall_assessments(updates, course_concepts)?
            .map(|root| score::collect_levels(&root))
            .unwrap_or_default())
    }
}

/// Ids from the node named `name` up to its task, searching depth-first.
fn find_path(state: &PerformanceState, name: &str) -> Option<Vec<NodeId>> {
    fn in_concept(concept: &ConceptPerformanceState, name: &str) -> Option<Vec<NodeId>> {
        if concept.state.name == name {
            return Some(vec![concept.state.node_id]);
        }
        concept.concepts.iter().find_map(|child| {
            in_concept(child, name).map(|mut path| {
                path.push(concept.state.node_id);
                path
            })
        })
    }

    state.tasks.values().find_map(|task| {
        if task.state.name == name {
            return Some(vec![task.state.node_id]);
        }
        task.concepts.iter().find_map(|concept| {
            in_concept(concept, name).map(|mut path| {
                path.push(task.state.node_id);
                path
            })
        })
    })
}

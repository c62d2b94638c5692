//! Hierarchical score tree and its bottom-up rollup.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use vigil_core::{AssessmentLevel, NodeId};

use crate::metric::score_levels;

/// A node of the score tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreNode {
    Graded(GradedScoreNode),
    Raw(RawScoreNode),
}

impl ScoreNode {
    #[must_use]
    pub fn level(&self) -> AssessmentLevel {
        match self {
            Self::Graded(node) => node.grade,
            Self::Raw(node) => node.assessment,
        }
    }

    #[must_use]
    pub fn as_graded(&self) -> Option<&GradedScoreNode> {
        match self {
            Self::Graded(node) => Some(node),
            Self::Raw(_) => None,
        }
    }
}

/// Composite score whose grade is derived from its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedScoreNode {
    pub name: String,
    /// Performance node this score belongs to; `None` for the scenario root.
    pub performance_node_id: Option<NodeId>,
    pub grade: AssessmentLevel,
    /// Set when the node's name is one of the course's concepts.
    #[serde(default)]
    pub course_concept: bool,
    #[serde(default)]
    pub children: Vec<ScoreNode>,
}

impl GradedScoreNode {
    /// Root score of a scenario.
    #[must_use]
    pub fn root(scenario_name: impl Into<String>) -> Self {
        Self {
            name: scenario_name.into(),
            performance_node_id: None,
            grade: AssessmentLevel::Unknown,
            course_concept: false,
            children: Vec::new(),
        }
    }

    /// Score of a performance node, not yet graded.
    #[must_use]
    pub fn for_node(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            performance_node_id: Some(node_id),
            ..Self::root(name)
        }
    }

    #[must_use]
    pub fn with_child(mut self, child: ScoreNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this node scores a leaf concept, i.e. it has raw children.
    #[must_use]
    pub fn is_leaf_concept(&self) -> bool {
        self.children.iter().any(|c| matches!(c, ScoreNode::Raw(_)))
    }

    /// Replace the graded child scoring the same performance node, or append.
    pub fn upsert_child(&mut self, child: GradedScoreNode) {
        let existing = self.children.iter_mut().find(|c| {
            c.as_graded()
                .is_some_and(|g| g.performance_node_id == child.performance_node_id)
        });
        match existing {
            Some(slot) => *slot = ScoreNode::Graded(child),
            None => self.children.push(ScoreNode::Graded(child)),
        }
    }

    fn graded_children_mut(&mut self) -> impl Iterator<Item = &mut GradedScoreNode> {
        self.children.iter_mut().filter_map(|c| match c {
            ScoreNode::Graded(node) => Some(node),
            ScoreNode::Raw(_) => None,
        })
    }

    /// Flag every graded node whose name is in `course_concepts`.
    pub fn mark_course_concepts(&mut self, course_concepts: &[String]) {
        self.course_concept = course_concepts.iter().any(|c| *c == self.name);
        for child in self.graded_children_mut() {
            child.mark_course_concepts(course_concepts);
        }
    }
}

/// Observed outcome of one condition under a leaf concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScoreNode {
    pub name: String,
    pub value: String,
    pub units: Option<String>,
    pub assessment: AssessmentLevel,
}

/// An observer's assessment of one condition, supplied for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreNodeUpdate {
    pub name: String,
    pub assessment: AssessmentLevel,
    #[serde(default)]
    pub value: String,
    pub units: Option<String>,
}

impl ScoreNodeUpdate {
    #[must_use]
    pub fn new(name: impl Into<String>, assessment: AssessmentLevel) -> Self {
        Self {
            name: name.into(),
            assessment,
            value: assessment.to_string(),
            units: None,
        }
    }

    #[must_use]
    pub fn to_raw(&self) -> RawScoreNode {
        RawScoreNode {
            name: self.name.clone(),
            value: self.value.clone(),
            units: self.units.clone(),
            assessment: self.assessment,
        }
    }
}

/// Recompute every graded node's grade from its children, bottom-up.
///
/// Recomputes the whole tree, so the result only depends on the raw scores
/// and is the same however often it runs. Returns the grade of each node
/// that scores a performance node.
pub fn perform_assessment_rollup(root: &mut GradedScoreNode) -> BTreeMap<NodeId, AssessmentLevel> {
    let mut levels = BTreeMap::new();
    roll_up_node(root, &mut levels);
    levels
}

fn roll_up_node(node: &mut GradedScoreNode, levels: &mut BTreeMap<NodeId, AssessmentLevel>) {
    for child in node.graded_children_mut() {
        roll_up_node(child, levels);
    }

    if !node.children.is_empty() {
        let weight = 1.0 / node.children.len() as f64;
        node.grade = score_levels(node.children.iter().map(|c| (c.level(), weight)));
    }

    if let Some(id) = node.performance_node_id {
        levels.insert(id, node.grade);
    }
}

/// Grades of every performance node in an already rolled-up tree.
#[must_use]
pub fn collect_levels(root: &GradedScoreNode) -> BTreeMap<NodeId, AssessmentLevel> {
    fn walk(node: &GradedScoreNode, levels: &mut BTreeMap<NodeId, AssessmentLevel>) {
        if let Some(id) = node.performance_node_id {
            levels.insert(id, node.grade);
        }
        for child in node.children.iter().filter_map(ScoreNode::as_graded) {
            walk(child, levels);
        }
    }

    let mut levels = BTreeMap::new();
    walk(root, &mut levels);
    levels
}

/// Existing leaf-concept scores, by performance node id.
#[must_use]
pub fn leaf_concept_scores(root: &GradedScoreNode) -> HashMap<NodeId, GradedScoreNode> {
    fn walk(node: &GradedScoreNode, found: &mut HashMap<NodeId, GradedScoreNode>) {
        if node.is_leaf_concept() {
            if let Some(id) = node.performance_node_id {
                found.insert(id, node.clone());
            }
        }
        for child in node.children.iter().filter_map(ScoreNode::as_graded) {
            walk(child, found);
        }
    }

    let mut found = HashMap::new();
    walk(root, &mut found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use AssessmentLevel::*;

    fn leaf(id: NodeId, name: &str, levels: &[AssessmentLevel]) -> GradedScoreNode {
        let node = GradedScoreNode::for_node(id, name);
        levels
            .iter()
            .enumerate()
            .map(|(i, level)| ScoreNodeUpdate::new(format!("cond-{i}"), *level).to_raw())
            .map(ScoreNode::Raw)
            .fold(node, GradedScoreNode::with_child)
    }

    fn sample() -> GradedScoreNode {
        let communication = leaf(10, "Communication", &[AboveExpectation]);
        let security = leaf(20, "Security", &[BelowExpectation, BelowExpectation]);
        let task = GradedScoreNode::for_node(1, "Clear the building")
            .with_child(ScoreNode::Graded(communication))
            .with_child(ScoreNode::Graded(security));
        GradedScoreNode::root("Urban Patrol").with_child(ScoreNode::Graded(task))
    }

    // ==================== Rollup Tests ====================

    #[test]
    fn rollup_grades_every_level() {
        let mut root = sample();
        let levels = perform_assessment_rollup(&mut root);

        assert_eq!(levels[&10], AboveExpectation);
        assert_eq!(levels[&20], BelowExpectation);
        // (4 + 0) / 2
        assert_eq!(levels[&1], AtExpectation);
        assert_eq!(root.grade, AtExpectation);
        assert_eq!(collect_levels(&root), levels);
    }

    #[test]
    fn rollup_is_idempotent() {
        let mut once = sample();
        perform_assessment_rollup(&mut once);
        let mut twice = once.clone();
        perform_assessment_rollup(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn stale_grades_are_recomputed() {
        let mut root = sample();
        if let ScoreNode::Graded(task) = &mut root.children[0] {
            task.grade = BelowExpectation;
        }
        let levels = perform_assessment_rollup(&mut root);
        assert_eq!(levels[&1], AtExpectation);
    }

    // ==================== Tree Helper Tests ====================

    #[test]
    fn leaf_concepts_are_found_at_any_depth() {
        let found = leaf_concept_scores(&sample());
        let mut ids: Vec<_> = found.keys().copied().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 20]);
        assert_eq!(found[&20].children.len(), 2);
    }

    #[test]
    fn upsert_replaces_matching_child() {
        let mut root = sample();
        root.upsert_child(GradedScoreNode::for_node(1, "Clear the building"));
        assert_eq!(root.children.len(), 1);
        assert!(root.children[0].as_graded().unwrap().is_leaf());

        root.upsert_child(GradedScoreNode::for_node(2, "Exfiltrate"));
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn course_concepts_are_flagged() {
        let mut root = sample();
        root.mark_course_concepts(&["Security".to_string()]);
        let task = root.children[0].as_graded().unwrap();
        assert!(!task.course_concept);
        assert!(!task.children[0].as_graded().unwrap().course_concept);
        assert!(task.children[1].as_graded().unwrap().course_concept);
    }
}

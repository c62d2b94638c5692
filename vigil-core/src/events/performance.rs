//! Performance-state model carried by learner state messages.
//!
//! A [`PerformanceState`] is the externally observed view of the assessed
//! hierarchy: tasks, their concepts and any nested sub-concepts, each
//! described by a [`PerformanceStateAttribute`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Identifier of a performance node, unique across a scenario's hierarchy.
pub type NodeId = u32;

/// Qualitative assessment of a performance node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentLevel {
    /// No assessment has been made.
    #[default]
    Unknown,
    /// Performance is below expectation.
    BelowExpectation,
    /// Performance is at expectation.
    AtExpectation,
    /// Performance is above expectation.
    AboveExpectation,
}

impl AssessmentLevel {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::BelowExpectation => "below_expectation",
            Self::AtExpectation => "at_expectation",
            Self::AboveExpectation => "above_expectation",
        }
    }
}

impl std::fmt::Display for AssessmentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a performance node within one session.
///
/// The scenario runtime moves nodes `Unactivated -> Active -> Finished`;
/// this crate only observes and times the transitions it is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    #[default]
    Unactivated,
    Active,
    Finished,
}

/// Externally observed assessment of one performance node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStateAttribute {
    pub node_id: NodeId,
    pub name: String,
    /// Current assessment level.
    pub short_term: AssessmentLevel,
    pub competence: f32,
    pub confidence: f32,
    pub priority: Option<u32>,
    pub trend: f32,
    #[serde(default)]
    pub assessment_hold: bool,
    #[serde(default)]
    pub competence_hold: bool,
    #[serde(default)]
    pub confidence_hold: bool,
    #[serde(default)]
    pub priority_hold: bool,
    #[serde(default)]
    pub trend_hold: bool,
    pub observer_comment: Option<String>,
    pub observer_media: Option<String>,
    pub evaluator: Option<String>,
    /// Per team-org entity assessment levels.
    #[serde(default)]
    pub assessed_team_org_entities: BTreeMap<String, AssessmentLevel>,
    #[serde(default)]
    pub node_state: ActivityState,
    /// Epoch millis at which this node's assessment was last produced.
    pub assessment_time: Option<i64>,
    #[serde(default)]
    pub assessment_explanation: BTreeSet<String>,
}

impl PerformanceStateAttribute {
    /// Create an unassessed attribute for a node.
    #[must_use]
    pub fn new(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            node_id,
            name: name.into(),
            short_term: AssessmentLevel::Unknown,
            competence: 0.0,
            confidence: 0.0,
            priority: None,
            trend: 0.0,
            assessment_hold: false,
            competence_hold: false,
            confidence_hold: false,
            priority_hold: false,
            trend_hold: false,
            observer_comment: None,
            observer_media: None,
            evaluator: None,
            assessed_team_org_entities: BTreeMap::new(),
            node_state: ActivityState::Unactivated,
            assessment_time: None,
            assessment_explanation: BTreeSet::new(),
        }
    }

    /// Set the assessment level.
    #[must_use]
    pub fn with_level(mut self, level: AssessmentLevel) -> Self {
        self.short_term = level;
        self
    }

    /// Set the activity state.
    #[must_use]
    pub fn with_node_state(mut self, state: ActivityState) -> Self {
        self.node_state = state;
        self
    }

    /// Set the assessment time.
    #[must_use]
    pub fn with_assessment_time(mut self, millis: i64) -> Self {
        self.assessment_time = Some(millis);
        self
    }

    /// Add a per-entity assessment level.
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>, level: AssessmentLevel) -> Self {
        self.assessed_team_org_entities.insert(entity.into(), level);
        self
    }
}

/// A concept's state, with nested sub-concepts when it is an intermediate concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptPerformanceState {
    pub state: PerformanceStateAttribute,
    #[serde(default)]
    pub concepts: Vec<ConceptPerformanceState>,
}

impl ConceptPerformanceState {
    #[must_use]
    pub fn leaf(state: PerformanceStateAttribute) -> Self {
        Self {
            state,
            concepts: Vec::new(),
        }
    }

    #[must_use]
    pub fn intermediate(
        state: PerformanceStateAttribute,
        concepts: Vec<ConceptPerformanceState>,
    ) -> Self {
        Self { state, concepts }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a PerformanceStateAttribute>) {
        out.push(&self.state);
        for concept in &self.concepts {
            concept.collect(out);
        }
    }
}

/// A task's state and its top-level concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPerformanceState {
    pub state: PerformanceStateAttribute,
    #[serde(default)]
    pub concepts: Vec<ConceptPerformanceState>,
}

impl TaskPerformanceState {
    #[must_use]
    pub fn new(state: PerformanceStateAttribute, concepts: Vec<ConceptPerformanceState>) -> Self {
        Self { state, concepts }
    }
}

/// Snapshot of the whole assessed hierarchy, keyed by task node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceState {
    #[serde(default)]
    pub tasks: BTreeMap<NodeId, TaskPerformanceState>,
}

impl PerformanceState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task, replacing any task with the same id.
    #[must_use]
    pub fn with_task(mut self, task: TaskPerformanceState) -> Self {
        self.tasks.insert(task.state.node_id, task);
        self
    }

    /// Every node in the snapshot, depth-first, tasks in id order.
    #[must_use]
    pub fn nodes(&self) -> Vec<&PerformanceStateAttribute> {
        let mut out = Vec::new();
        for task in self.tasks.values() {
            out.push(&task.state);
            for concept in &task.concepts {
                concept.collect(&mut out);
            }
        }
        out
    }
}

/// Learner state payload: the state-snapshot message of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerState {
    pub performance: PerformanceState,
}

impl LearnerState {
    #[must_use]
    pub fn new(performance: PerformanceState) -> Self {
        Self { performance }
    }
}

//! vigil-assess - Performance assessment rollup
//!
//! This crate mirrors a scenario's task/concept hierarchy and keeps derived
//! assessments consistent with evaluator edits:
//!
//! - **Assessment tree**: arena of tasks, concepts and intermediate concepts
//! - **Performance metrics**: pluggable per-node grading, weighted by default
//! - **Rollup engine**: applies an edit and recomputes every ancestor
//! - **Score tree**: overall graded scores rebuilt from observer assessments
//!
//! Performance state and node ids come from `vigil-core`.

pub mod assessment;
pub mod error;
pub mod grade;
pub mod metric;
pub mod rollup;
pub mod score;
pub mod tree;
pub mod update;

pub use assessment::Assessment;
pub use error::{AssessError, Result};
pub use grade::{GradeInputs, GradeMetric, ObserverGradeMetric};
pub use metric::{ChildLevel, PerformanceMetric, WeightedPerformanceMetric};
pub use rollup::RollupEngine;
pub use score::{
    GradedScoreNode, RawScoreNode, ScoreNode, ScoreNodeUpdate, leaf_concept_scores,
    perform_assessment_rollup,
};
pub use tree::{
    AssessmentTree, AssessmentTreeBuilder, ConceptDefinition, NodeKind, PerformanceNode,
    ScenarioDefinition, TaskDefinition,
};
pub use update::EvaluatorUpdate;

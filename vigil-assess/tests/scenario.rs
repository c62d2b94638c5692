//! End-to-end rollup over a scenario loaded from its definition
//!
//! These tests validate the engine the way a host drives it:
//! - Build the tree from a JSON scenario definition
//! - Apply evaluator edits against the last observed learner state
//! - Score the overall assessment from observer condition assessments

use std::collections::HashMap;

use vigil_assess::{
    AssessmentTree, EvaluatorUpdate, RollupEngine, ScenarioDefinition, ScoreNodeUpdate,
};
use vigil_core::{
    ActivityState, AssessmentLevel, ConceptPerformanceState, PerformanceState,
    PerformanceStateAttribute, TaskPerformanceState,
};

const DEFINITION: &str = r#"{
    "name": "Single Task",
    "tasks": [
        { "id": 1, "name": "T1", "concepts": [ { "id": 10, "name": "C1" } ] }
    ]
}"#;

fn engine() -> RollupEngine {
    let definition = ScenarioDefinition::from_json_str(DEFINITION).unwrap();
    RollupEngine::new(AssessmentTree::from_definition(&definition).unwrap())
}

fn observed() -> PerformanceState {
    let concept = PerformanceStateAttribute::new(10, "C1")
        .with_node_state(ActivityState::Active)
        .with_entity("alpha", AssessmentLevel::Unknown);
    let task = PerformanceStateAttribute::new(1, "T1").with_node_state(ActivityState::Active);
    let concepts = vec![ConceptPerformanceState::leaf(concept)];
    PerformanceState::new().with_task(TaskPerformanceState::new(task, concepts))
}

#[test]
fn leaf_edit_rolls_up_to_task() {
    let mut engine = engine();
    let update = EvaluatorUpdate::new("C1", 1_000)
        .with_level(AssessmentLevel::AboveExpectation)
        .with_evaluator("observer-1");

    let changed = engine.apply_and_roll_up(&update, &observed()).unwrap();

    let ids: Vec<_> = changed.iter().map(|a| a.node_id).collect();
    assert_eq!(ids, vec![10, 1]);

    let concept = &changed[0];
    assert_eq!(concept.short_term, AssessmentLevel::AboveExpectation);
    let alpha = concept.assessed_team_org_entities["alpha"];
    assert_eq!(alpha, AssessmentLevel::AboveExpectation);
    assert_eq!(concept.evaluator.as_deref(), Some("observer-1"));
    assert_eq!(concept.assessment_time, Some(1_000));
    let explanation = &concept.assessment_explanation;
    assert!(explanation.contains("[alpha] has been assessed."));

    let task = &changed[1];
    assert_eq!(task.short_term, AssessmentLevel::AboveExpectation);
    assert_eq!(task.node_state, ActivityState::Active);
}

#[test]
fn each_edit_starts_from_observed_state() {
    let mut engine = engine();
    let first = EvaluatorUpdate::new("C1", 1).with_level(AssessmentLevel::BelowExpectation);
    engine.apply_and_roll_up(&first, &observed()).unwrap();

    // The second edit only sets a comment; the level comes from the observed state again.
    let second = EvaluatorUpdate::new("C1", 2).with_reason("Lost comms");
    let changed = engine.apply_and_roll_up(&second, &observed()).unwrap();

    assert_eq!(changed[0].short_term, AssessmentLevel::Unknown);
    assert!(changed[0].assessment_explanation.contains("Lost comms"));
    assert_eq!(changed[1].short_term, AssessmentLevel::Unknown);
}

#[test]
fn overall_score_is_repeatable() {
    let mut engine = engine();
    let conditions = vec![
        ScoreNodeUpdate::new("Report contact", AssessmentLevel::AtExpectation),
        ScoreNodeUpdate::new("Maintain cover", AssessmentLevel::BelowExpectation),
    ];
    let updates = HashMap::from([(10, conditions)]);
    let course = vec!["C1".to_string()];

    let first = engine.score_overall_assessments(&updates, &course);
    let second = engine.score_overall_assessments(&updates, &course);
    assert_eq!(first, second);

    let root = first.unwrap().unwrap();
    assert_eq!(root.name, "Single Task");
    let task = root.children[0].as_graded().unwrap();
    // (2 + 0) / 2 = 1.0
    assert_eq!(task.grade, AssessmentLevel::BelowExpectation);

    // Later passes start from the host's current score and reuse its leaf scores.
    engine.set_current_score(Some(root.clone()));
    let none = HashMap::new();
    let rescored = engine.score_overall_assessments(&none, &course).unwrap();
    assert_eq!(rescored, Some(root));

    let levels = engine.calculate_roll_up(&updates, &course).unwrap();
    assert_eq!(levels[&10], AssessmentLevel::BelowExpectation);
    assert_eq!(levels[&1], AssessmentLevel::BelowExpectation);
}

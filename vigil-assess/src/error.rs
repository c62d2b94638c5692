//! Error types for vigil-assess

use thiserror::Error;
use vigil_core::NodeId;

/// Error type for assessment tree and rollup operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssessError {
    /// A performance state referenced a node the tree does not contain
    #[error("No performance node with id {0}")]
    UnknownNode(NodeId),

    /// A performance state placed a node where its kind does not fit
    #[error("Performance node {id} is not a {expected}")]
    NodeKindMismatch { id: NodeId, expected: &'static str },

    /// Two nodes in a scenario definition share an id
    #[error("Duplicate performance node id {0}")]
    DuplicateNodeId(NodeId),

    /// A required argument was missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A grade metric failed while scoring a task
    #[error("Failed to calculate the score for task '{task}': {reason}")]
    Grading { task: String, reason: String },
}

/// Result type alias for assessment operations
pub type Result<T> = std::result::Result<T, AssessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mismatch_names_expected_kind() {
        let err = AssessError::NodeKindMismatch {
            id: 4,
            expected: "task",
        };
        assert_eq!(err.to_string(), "Performance node 4 is not a task");
    }

    #[test]
    fn grading_error_names_task() {
        let err = AssessError::Grading {
            task: "Clear the building".into(),
            reason: "no conditions".into(),
        };
        assert!(err.to_string().contains("'Clear the building'"));
    }
}

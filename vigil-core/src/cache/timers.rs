//! Per-node activity timers derived from successive state snapshots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::events::{ActivityState, NodeId, PerformanceState};

/// Accumulated activity time of one performance node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTimer {
    /// When the node last became active (epoch millis).
    pub last_active_timestamp: Option<i64>,
    /// Total millis spent active across completed activations.
    pub cumulative_active_millis: i64,
}

/// Advance `timers` from the `previous` snapshot to the `current` one.
///
/// A node entering `Active` records its timestamp; a node leaving `Active`
/// adds the elapsed time since then. A node already active in the first
/// snapshot seen counts as having just become active.
pub(crate) fn advance(
    timers: &mut HashMap<NodeId, TaskTimer>,
    previous: Option<&PerformanceState>,
    current: &PerformanceState,
    message_timestamp: i64,
) {
    let before: HashMap<NodeId, ActivityState> = previous
        .map(|state| {
            state
                .nodes()
                .into_iter()
                .map(|node| (node.node_id, node.node_state))
                .collect()
        })
        .unwrap_or_default();

    for node in current.nodes() {
        let was = before.get(&node.node_id).copied();
        let now = node.node_state;
        let timestamp = node.assessment_time.unwrap_or(message_timestamp);
        let timer = timers.entry(node.node_id).or_default();

        match (was, now) {
            (Some(ActivityState::Active), ActivityState::Active) => {}
            (Some(ActivityState::Finished), ActivityState::Active) => {
                tracing::warn!(
                    node_id = node.node_id,
                    "Node reported active again after finishing"
                );
                timer.last_active_timestamp = Some(timestamp);
            }
            (_, ActivityState::Active) => {
                timer.last_active_timestamp = Some(timestamp);
            }
            (Some(ActivityState::Active), _) => {
                if let Some(started) = timer.last_active_timestamp {
                    let elapsed = timestamp.saturating_sub(started);
                    timer.cumulative_active_millis =
                        timer.cumulative_active_millis.saturating_add(elapsed);
                }
            }
            _ => {}
        }
    }
}

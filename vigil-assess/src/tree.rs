//! In-memory mirror of a scenario's performance-node hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vigil_core::NodeId;

use crate::assessment::Assessment;
use crate::error::{AssessError, Result};
use crate::metric::{PerformanceMetric, WeightedPerformanceMetric};

/// Position a node holds in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Top-level node.
    Task,
    /// Concept with no sub-concepts.
    Concept,
    /// Concept with nested sub-concepts.
    IntermediateConcept,
}

impl NodeKind {
    #[must_use]
    pub fn is_concept(&self) -> bool {
        matches!(self, Self::Concept | Self::IntermediateConcept)
    }
}

/// One task or concept of the tree.
#[derive(Debug)]
pub struct PerformanceNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub assessment: Assessment,
    pub metric: Arc<dyn PerformanceMetric>,
}

/// Rooted forest of tasks, each owning concepts that may nest.
///
/// Node ids are unique across the whole tree. The shape is fixed once built;
/// only each node's [`Assessment`] changes afterwards.
#[derive(Debug)]
pub struct AssessmentTree {
    scenario_name: String,
    nodes: HashMap<NodeId, PerformanceNode>,
    tasks: Vec<NodeId>,
}

impl AssessmentTree {
    /// Start building a tree for a scenario.
    #[must_use]
    pub fn builder(scenario_name: impl Into<String>) -> AssessmentTreeBuilder {
        AssessmentTreeBuilder {
            tree: Self {
                scenario_name: scenario_name.into(),
                nodes: HashMap::new(),
                tasks: Vec::new(),
            },
        }
    }

    /// Build a tree from a scenario definition.
    ///
    /// A node whose children all carry a weight grades with those weights;
    /// otherwise its children weigh the same.
    pub fn from_definition(definition: &ScenarioDefinition) -> Result<Self> {
        let mut builder = Self::builder(&definition.name);
        for task in &definition.tasks {
            builder = builder.task(task.id, &task.name)?;
            builder = builder.metric(task.id, weighted_metric(&task.concepts))?;
            for concept in &task.concepts {
                builder = add_concept(builder, task.id, concept)?;
            }
        }
        Ok(builder.build())
    }

    #[must_use]
    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    /// Task ids in definition order.
    #[must_use]
    pub fn tasks(&self) -> &[NodeId] {
        &self.tasks
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&PerformanceNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut PerformanceNode> {
        self.nodes.get_mut(&id)
    }

    /// Look up a node, requiring it to be of a kind accepted by `accept`.
    pub(crate) fn expect_node(
        &mut self,
        id: NodeId,
        expected: &'static str,
        accept: impl Fn(NodeKind) -> bool,
    ) -> Result<&mut PerformanceNode> {
        let node = self.nodes.get_mut(&id).ok_or(AssessError::UnknownNode(id))?;
        if accept(node.kind) {
            Ok(node)
        } else {
            Err(AssessError::NodeKindMismatch { id, expected })
        }
    }

    /// Children of a node in definition order; empty for unknown ids.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// Whether `id` or any of its descendants is in `targets`.
    #[must_use]
    pub fn contains_any(&self, id: NodeId, targets: &impl Fn(NodeId) -> bool) -> bool {
        if targets(id) {
            return true;
        }
        self.children(id)
            .iter()
            .any(|child| self.contains_any(*child, targets))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn weighted_metric(children: &[ConceptDefinition]) -> Arc<dyn PerformanceMetric> {
    let metric = children
        .iter()
        .filter_map(|c| c.weight.map(|w| (c.id, w)))
        .fold(WeightedPerformanceMetric::new(), |metric, (id, weight)| {
            metric.with_weight(id, weight)
        });
    Arc::new(metric)
}

fn add_concept(
    builder: AssessmentTreeBuilder,
    parent: NodeId,
    concept: &ConceptDefinition,
) -> Result<AssessmentTreeBuilder> {
    let mut builder = builder
        .concept(parent, concept.id, &concept.name)?
        .metric(concept.id, weighted_metric(&concept.concepts))?;
    for child in &concept.concepts {
        builder = add_concept(builder, concept.id, child)?;
    }
    Ok(builder)
}

/// Incremental construction of an [`AssessmentTree`].
#[derive(Debug)]
pub struct AssessmentTreeBuilder {
    tree: AssessmentTree,
}

impl AssessmentTreeBuilder {
    fn insert(
        &mut self,
        id: NodeId,
        name: &str,
        kind: NodeKind,
        parent: Option<NodeId>,
    ) -> Result<()> {
        if self.tree.nodes.contains_key(&id) {
            return Err(AssessError::DuplicateNodeId(id));
        }
        if name.trim().is_empty() {
            let reason = format!("node {id} has a blank name");
            return Err(AssessError::InvalidArgument(reason));
        }
        self.tree.nodes.insert(
            id,
            PerformanceNode {
                id,
                name: name.to_string(),
                kind,
                parent,
                children: Vec::new(),
                assessment: Assessment::default(),
                metric: Arc::new(WeightedPerformanceMetric::new()),
            },
        );
        Ok(())
    }

    /// Add a top-level task.
    pub fn task(mut self, id: NodeId, name: &str) -> Result<Self> {
        self.insert(id, name, NodeKind::Task, None)?;
        self.tree.tasks.push(id);
        Ok(self)
    }

    /// Add a concept under a task or another concept.
    ///
    /// A concept parent becomes an intermediate concept.
    pub fn concept(mut self, parent: NodeId, id: NodeId, name: &str) -> Result<Self> {
        if !self.tree.nodes.contains_key(&parent) {
            return Err(AssessError::UnknownNode(parent));
        }
        self.insert(id, name, NodeKind::Concept, Some(parent))?;
        if let Some(parent_node) = self.tree.nodes.get_mut(&parent) {
            parent_node.children.push(id);
            if parent_node.kind == NodeKind::Concept {
                parent_node.kind = NodeKind::IntermediateConcept;
            }
        }
        Ok(self)
    }

    /// Replace the grading capability of a node.
    pub fn metric(mut self, id: NodeId, metric: Arc<dyn PerformanceMetric>) -> Result<Self> {
        let node = self.tree.node_mut(id).ok_or(AssessError::UnknownNode(id))?;
        node.metric = metric;
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> AssessmentTree {
        self.tree
    }
}

/// Serializable description of a scenario's hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

impl ScenarioDefinition {
    /// Parse a definition from JSON.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| AssessError::InvalidArgument(format!("invalid scenario definition: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub concepts: Vec<ConceptDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptDefinition {
    pub id: NodeId,
    pub name: String,
    /// Share of the parent's grade this concept accounts for.
    pub weight: Option<f64>,
    #[serde(default)]
    pub concepts: Vec<ConceptDefinition>,
}

//! # Metamodels
//!
//! The catalog-facing descriptions of nodes, workflows, and intents. A [`NodeMetamodel`]
//! is a tagged sum over the node kinds the engine knows how to run (mirroring the
//! redesign away from the teacher's `TypeId`-keyed inheritance hierarchy); a
//! [`WorkflowMetamodel`] is the declarative DAG an executor resolves into a
//! [`crate::workflow_instance::WorkflowInstance`]; an [`IntentMetamodel`] is what the
//! intent detector matches against.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::port::Port;

/// Semantic version with an optional free-text label (e.g. `"canary"`),
/// which may change independently of the numeric components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// A bump from `self` to `next` is valid iff it is exactly one of:
    /// a patch bump (major, minor unchanged, patch + 1), a minor bump
    /// (major unchanged, minor + 1, patch reset to 0), or a major bump
    /// (major + 1, minor and patch reset to 0).
    pub fn is_valid_bump(&self, next: &Version) -> bool {
        (next.major == self.major && next.minor == self.minor && next.patch == self.patch + 1)
            || (next.major == self.major && next.minor == self.minor + 1 && next.patch == 0)
            || (next.major == self.major + 1 && next.minor == 0 && next.patch == 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Fields shared by every node-kind variant of [`NodeMetamodel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetamodelHeader {
    pub id: String,
    pub family_id: String,
    pub version: Version,
    pub is_latest: bool,
    pub enabled: bool,
    pub name: String,
    pub description: String,
    pub author: String,
    /// Free-text description of what the node does, embedded for semantic
    /// retrieval by the catalog.
    pub qualitative_descriptor: String,
    /// Operational characteristics (latency class, cost class) used by the
    /// router's ranking, kept as a small structured descriptor rather than
    /// a fully modeled cost function.
    pub quantitative_descriptor: QuantitativeDescriptor,
    pub embedding: Vec<f32>,
    pub input_ports: Vec<Port>,
    pub output_ports: Vec<Port>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuantitativeDescriptor {
    pub expected_latency_ms: u32,
    pub cost_weight: f64,
}

/// HTTP method for a REST node's outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Per-call generation parameters for an LLM node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmParameters {
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A node metamodel: the catalog's description of one runnable unit,
/// tagged by effector kind. The AI family covers `Llm`/`Embeddings`; the
/// TOOL family covers `Rest`/`VectorDb`; the FLOW family covers `Gateway`
/// (a pass-through join/merge point with no external call).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeMetamodel {
    Llm {
        header: NodeMetamodelHeader,
        provider: String,
        model_name: String,
        system_prompt_template: String,
        parameters: LlmParameters,
    },
    Embeddings {
        header: NodeMetamodelHeader,
        provider: String,
        model_name: String,
    },
    VectorDb {
        header: NodeMetamodelHeader,
        uri: String,
        database_name: String,
        collection_name: String,
        index_name: String,
        vector_field: String,
        limit: u32,
        similarity_threshold: f64,
    },
    Rest {
        header: NodeMetamodelHeader,
        service_uri: String,
        method: HttpMethod,
        headers: BTreeMap<String, String>,
    },
    Gateway {
        header: NodeMetamodelHeader,
    },
}

impl NodeMetamodel {
    pub fn header(&self) -> &NodeMetamodelHeader {
        match self {
            NodeMetamodel::Llm { header, .. }
            | NodeMetamodel::Embeddings { header, .. }
            | NodeMetamodel::VectorDb { header, .. }
            | NodeMetamodel::Rest { header, .. }
            | NodeMetamodel::Gateway { header, .. } => header,
        }
    }

    pub fn id(&self) -> &str {
        &self.header().id
    }

    pub fn input_ports(&self) -> &[Port] {
        &self.header().input_ports
    }

    pub fn output_ports(&self) -> &[Port] {
        &self.header().output_ports
    }

    /// Validates that `next` is a valid successor metamodel of `self` in the
    /// same family: same `family_id`, and a semver-valid version bump.
    pub fn validate_version_bump(&self, next: &NodeMetamodel) -> Result<()> {
        let (from, to) = (self.header(), next.header());
        if from.family_id != to.family_id {
            return Err(WorkflowError::Validation {
                message: format!(
                    "version bump must stay within a family: {} -> {}",
                    from.family_id, to.family_id
                ),
            });
        }
        if !from.version.is_valid_bump(&to.version) {
            return Err(WorkflowError::InvalidVersionBump {
                from: from.version.to_string(),
                to: to.version.to_string(),
            });
        }
        Ok(())
    }
}

/// How a node gates on its incoming edges before becoming `READY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionType {
    /// Waits for every incoming edge whose condition is satisfied (or has no
    /// condition) to have fired before running.
    Join,
    /// Runs as soon as any single incoming edge fires.
    Merge,
}

impl Default for ExecutionType {
    fn default() -> Self {
        Self::Join
    }
}

/// One placement of a node within a workflow's DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub node_metamodel_id: String,
    #[serde(default)]
    pub execution_type: ExecutionType,
}

/// Comparison operator for an [`Expression`] evaluated against a context
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    StartsWith,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    IsTrue,
    IsFalse,
}

/// A single comparison: the value at `port` (a dotted context path)
/// compared against `value` via `operation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub port: String,
    pub operation: Operation,
    pub value: serde_json::Value,
}

/// A boolean combination of [`Expression`]s gating an edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "combinator")]
pub enum EdgeCondition {
    Leaf(Expression),
    And(Vec<EdgeCondition>),
    Or(Vec<EdgeCondition>),
}

impl EdgeCondition {
    /// Evaluates this condition against `ctx`, resolving each leaf
    /// expression's `port` path through `resolve`.
    pub fn evaluate(&self, resolve: &impl Fn(&str) -> serde_json::Value) -> bool {
        match self {
            EdgeCondition::Leaf(expr) => Self::evaluate_expression(expr, resolve(&expr.port)),
            EdgeCondition::And(children) => children.iter().all(|c| c.evaluate(resolve)),
            EdgeCondition::Or(children) => children.iter().any(|c| c.evaluate(resolve)),
        }
    }

    fn evaluate_expression(expr: &Expression, actual: serde_json::Value) -> bool {
        use serde_json::Value;
        match expr.operation {
            Operation::IsNull => actual.is_null(),
            Operation::IsNotNull => !actual.is_null(),
            Operation::IsTrue => actual.as_bool().unwrap_or(false),
            Operation::IsFalse => actual.as_bool().map(|b| !b).unwrap_or(false),
            Operation::Equals => actual == expr.value,
            Operation::NotEquals => actual != expr.value,
            Operation::GreaterThan => match (actual.as_f64(), expr.value.as_f64()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            Operation::LessThan => match (actual.as_f64(), expr.value.as_f64()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            Operation::Contains => match (&actual, &expr.value) {
                (Value::String(a), Value::String(b)) => a.contains(b.as_str()),
                (Value::Array(a), b) => a.contains(b),
                _ => false,
            },
            Operation::StartsWith => match (actual.as_str(), expr.value.as_str()) {
                (Some(a), Some(b)) => a.starts_with(b),
                _ => false,
            },
            Operation::In => match expr.value.as_array() {
                Some(arr) => arr.contains(&actual),
                None => false,
            },
            Operation::NotIn => match expr.value.as_array() {
                Some(arr) => !arr.contains(&actual),
                None => true,
            },
        }
    }
}

/// A directed edge between two [`WorkflowNode`]s, carrying the port
/// bindings applied to the target node's context namespace when the edge
/// fires, and an optional gating condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    /// Maps a source output port path to a target input port key.
    pub bindings: BTreeMap<String, String>,
    pub condition: Option<EdgeCondition>,
}

/// An intent this workflow declares it can satisfy, along with the
/// router's current ranking signal for that pairing. `score` is learned
/// over time (reinforced by successful runs, decayed by failures or
/// disuse) rather than fixed at declaration time, which is why it travels
/// with the workflow metamodel instead of living on the intent itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandledIntent {
    pub intent_id: String,
    pub score: f64,
    pub last_executed: Option<DateTime<Utc>>,
}

/// The catalog's declarative description of a DAG: nodes, the edges between
/// them, and the intents it handles. Resolved into a
/// [`crate::workflow_instance::WorkflowInstance`] before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetamodel {
    pub id: String,
    pub version: Version,
    pub name: String,
    pub enabled: bool,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub handled_intents: Vec<HandledIntent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowMetamodel {
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The handled-intent entry declaring support for `intent_id`, if any.
    /// Used by the router to read the ranking score for a candidate
    /// workflow relative to the intent being routed.
    pub fn handled_intent(&self, intent_id: &str) -> Option<&HandledIntent> {
        self.handled_intents.iter().find(|hi| hi.intent_id == intent_id)
    }

    pub fn edges_into(&self, node_id: &str) -> impl Iterator<Item = &WorkflowEdge> {
        self.edges.iter().filter(move |e| e.target_node_id == node_id)
    }

    pub fn edges_from(&self, node_id: &str) -> impl Iterator<Item = &WorkflowEdge> {
        self.edges.iter().filter(move |e| e.source_node_id == node_id)
    }

    pub fn entry_node_ids(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| self.edges_into(id).next().is_none())
            .collect()
    }

    pub fn exit_node_ids(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| self.edges_from(id).next().is_none())
            .collect()
    }

    /// Detects a cycle in the edge set via a three-color DFS. Edges whose
    /// condition can never be statically proven dead still count toward the
    /// graph for this check — conditional inactivity is a runtime property,
    /// not a structural one (see `DESIGN.md` open-question resolution).
    pub fn validate_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut colors: BTreeMap<&str, Color> =
            self.nodes.iter().map(|n| (n.id.as_str(), Color::White)).collect();

        fn visit<'a>(
            wf: &'a WorkflowMetamodel,
            node_id: &'a str,
            colors: &mut BTreeMap<&'a str, Color>,
        ) -> Result<()> {
            colors.insert(node_id, Color::Gray);
            for edge in wf.edges_from(node_id) {
                match colors.get(edge.target_node_id.as_str()) {
                    Some(Color::Gray) => return Err(WorkflowError::WorkflowCycle),
                    Some(Color::White) => visit(wf, &edge.target_node_id, colors)?,
                    _ => {}
                }
            }
            colors.insert(node_id, Color::Black);
            Ok(())
        }

        for node in &self.nodes {
            if colors.get(node.id.as_str()) == Some(&Color::White) {
                visit(self, &node.id, &mut colors)?;
            }
        }
        Ok(())
    }

    /// Validates that every edge references nodes that exist in this
    /// metamodel's node set.
    pub fn validate_no_dangling_edges(&self) -> Result<()> {
        for edge in &self.edges {
            if self.node(&edge.source_node_id).is_none() {
                return Err(WorkflowError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    reason: format!("unknown source node '{}'", edge.source_node_id),
                });
            }
            if self.node(&edge.target_node_id).is_none() {
                return Err(WorkflowError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    reason: format!("unknown target node '{}'", edge.target_node_id),
                });
            }
        }
        Ok(())
    }
}

/// A catalog-registered intent: a named, embedded description of a user
/// goal the router matches workflows against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMetamodel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub ai_generated: bool,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_bump_accepts_patch_minor_major_steps() {
        let v = Version::new(1, 2, 3);
        assert!(v.is_valid_bump(&Version::new(1, 2, 4)));
        assert!(v.is_valid_bump(&Version::new(1, 3, 0)));
        assert!(v.is_valid_bump(&Version::new(2, 0, 0)));
    }

    #[test]
    fn version_bump_rejects_skips_and_non_resets() {
        let v = Version::new(1, 2, 3);
        assert!(!v.is_valid_bump(&Version::new(1, 2, 5)));
        assert!(!v.is_valid_bump(&Version::new(1, 3, 1)));
        assert!(!v.is_valid_bump(&Version::new(2, 1, 0)));
        assert!(!v.is_valid_bump(&Version::new(1, 2, 3)));
    }

    fn wf(nodes: Vec<&str>, edges: Vec<(&str, &str)>) -> WorkflowMetamodel {
        WorkflowMetamodel {
            id: "wf".into(),
            version: Version::new(1, 0, 0),
            name: "test".into(),
            enabled: true,
            nodes: nodes
                .into_iter()
                .map(|id| WorkflowNode {
                    id: id.to_string(),
                    node_metamodel_id: "nm".into(),
                    execution_type: ExecutionType::Join,
                })
                .collect(),
            edges: edges
                .into_iter()
                .enumerate()
                .map(|(i, (s, t))| WorkflowEdge {
                    id: format!("e{i}"),
                    source_node_id: s.to_string(),
                    target_node_id: t.to_string(),
                    bindings: BTreeMap::new(),
                    condition: None,
                })
                .collect(),
            handled_intents: vec![],
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn acyclic_dag_passes_validation() {
        let workflow = wf(vec!["a", "b", "c"], vec![("a", "b"), ("b", "c")]);
        assert!(workflow.validate_acyclic().is_ok());
    }

    #[test]
    fn cycle_is_detected() {
        let workflow = wf(vec!["a", "b"], vec![("a", "b"), ("b", "a")]);
        assert!(matches!(workflow.validate_acyclic(), Err(WorkflowError::WorkflowCycle)));
    }

    #[test]
    fn dangling_edge_is_detected() {
        let workflow = wf(vec!["a"], vec![("a", "ghost")]);
        assert!(matches!(
            workflow.validate_no_dangling_edges(),
            Err(WorkflowError::DanglingEdge { .. })
        ));
    }

    #[test]
    fn entry_and_exit_nodes_are_identified() {
        let workflow = wf(vec!["a", "b", "c"], vec![("a", "b"), ("b", "c")]);
        assert_eq!(workflow.entry_node_ids(), vec!["a"]);
        assert_eq!(workflow.exit_node_ids(), vec!["c"]);
    }

    #[test]
    fn edge_condition_and_or_combinators_evaluate() {
        let ctx: BTreeMap<String, serde_json::Value> = [
            ("score".to_string(), serde_json::json!(0.8)),
            ("label".to_string(), serde_json::json!("ok")),
        ]
        .into_iter()
        .collect();
        let resolve = |path: &str| ctx.get(path).cloned().unwrap_or(serde_json::Value::Null);

        let cond = EdgeCondition::And(vec![
            EdgeCondition::Leaf(Expression {
                port: "score".into(),
                operation: Operation::GreaterThan,
                value: serde_json::json!(0.5),
            }),
            EdgeCondition::Leaf(Expression {
                port: "label".into(),
                operation: Operation::Equals,
                value: serde_json::json!("ok"),
            }),
        ]);
        assert!(cond.evaluate(&resolve));

        let cond_or = EdgeCondition::Or(vec![
            EdgeCondition::Leaf(Expression {
                port: "label".into(),
                operation: Operation::Equals,
                value: serde_json::json!("nope"),
            }),
            EdgeCondition::Leaf(Expression {
                port: "score".into(),
                operation: Operation::GreaterThan,
                value: serde_json::json!(0.5),
            }),
        ]);
        assert!(cond_or.evaluate(&resolve));
    }
}

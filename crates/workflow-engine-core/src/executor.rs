//! # Workflow Executor
//!
//! Runs a [`WorkflowInstance`] to completion against an [`ExecutionContext`], advancing
//! each node through `PENDING -> READY -> RUNNING -> {COMPLETED, SKIPPED, FAILED}`.
//! Concurrency is bounded by a [`tokio::sync::Semaphore`] sized to the workflow's node
//! count (capped at 16), replacing the teacher's one-`thread::spawn`-per-parallel-node
//! approach (`workflow/mod.rs::execute_parallel_nodes`). Context mutation — writing a
//! node's outputs into its namespace and applying edge bindings to its successors' — is
//! the scheduler's job alone: effectors receive an owned, read-only snapshot of their
//! inputs and never see the shared context, so two concurrently running effectors never
//! race on a write (spec §5.iii).
//!
//! Every node, edge, and adaptation decision the scheduler makes is captured into a
//! [`WorkflowObservabilityReport`] (spec §4.E), regardless of whether the caller asked
//! for it — the orchestrator decides whether to surface it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::context::ExecutionContext;
use crate::error::{Result, WorkflowError};
use crate::metamodel::{ExecutionType, NodeMetamodel, WorkflowNode};
use crate::node_instance::NodeInputs;
use crate::workflow_instance::WorkflowInstance;

/// Output key an LLM-backed effector may set alongside its declared output
/// ports to report the provider's token accounting for this call. The
/// executor strips it out of the outputs it writes into the shared context
/// and folds it into the node's [`NodeExecutionRecord`] instead, so it never
/// leaks into workflow data that other nodes' ports can bind against.
pub const TOKEN_USAGE_OUTPUT_KEY: &str = "$token_usage";

/// Lifecycle state of one workflow node within a single execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Completed,
    Skipped,
    Failed,
}

/// Hook invoked by the executor when a `READY` node still has null required
/// inputs after default values have been applied. Implemented by the Port
/// Adapter in `workflow-engine-api`; tests use a no-op or fixed-response
/// fake.
#[async_trait]
pub trait PortAdapterHook: Send + Sync {
    /// Attempts to resolve `missing_keys` on `node_metamodel`'s input ports,
    /// given the rest of the current context for reference. Returns the
    /// bindings it could establish, keyed by input port key. Returning fewer
    /// entries than `missing_keys` asked for is a partial success; the
    /// executor re-checks what remains unsatisfied afterward.
    async fn adapt(
        &self,
        node_id: &str,
        missing_keys: &[String],
        node_metamodel: &NodeMetamodel,
        ctx: &ExecutionContext,
    ) -> Result<BTreeMap<String, Value>>;
}

/// A provider's token accounting for one LLM completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One context key that was added, modified, or removed by a node's
/// execution, carrying the value on each side of the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextKeyChange {
    pub key: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// The set of top-level context keys a node's execution added, modified, or
/// removed, computed by comparing the whole execution context immediately
/// before and after the node's outputs were written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextDiff {
    pub added: Vec<ContextKeyChange>,
    pub modified: Vec<ContextKeyChange>,
    pub removed: Vec<ContextKeyChange>,
}

impl ContextDiff {
    fn compute(before: &Value, after: &Value) -> Self {
        let empty = serde_json::Map::new();
        let before_map = before.as_object().unwrap_or(&empty);
        let after_map = after.as_object().unwrap_or(&empty);

        let keys: BTreeSet<&String> = before_map.keys().chain(after_map.keys()).collect();
        let mut diff = ContextDiff::default();
        for key in keys {
            match (before_map.get(key), after_map.get(key)) {
                (None, Some(after_value)) => diff.added.push(ContextKeyChange {
                    key: key.clone(),
                    before: None,
                    after: Some(after_value.clone()),
                }),
                (Some(before_value), None) => diff.removed.push(ContextKeyChange {
                    key: key.clone(),
                    before: Some(before_value.clone()),
                    after: None,
                }),
                (Some(before_value), Some(after_value)) if before_value != after_value => {
                    diff.modified.push(ContextKeyChange {
                        key: key.clone(),
                        before: Some(before_value.clone()),
                        after: Some(after_value.clone()),
                    })
                }
                _ => {}
            }
        }
        diff
    }
}

/// Record of one node's execution within a [`WorkflowObservabilityReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    pub node_id: String,
    pub state: NodeState,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub token_usage: Option<TokenUsage>,
    pub context_diff: ContextDiff,
    pub error: Option<String>,
}

/// Record of whether one edge fired during execution, and — when it did —
/// the bindings it applied onto its target's namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeExecutionRecord {
    pub edge_id: String,
    pub fired: bool,
    pub applied_bindings: BTreeMap<String, Value>,
}

/// Record of one port-adapter invocation: what was missing, what the
/// adapter proposed, and whether the node's inputs were fully satisfied
/// afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationRecord {
    pub node_id: String,
    pub missing_inputs: Vec<String>,
    pub proposed_bindings: BTreeMap<String, Value>,
    pub success: bool,
}

/// Aggregate, per-run report the orchestrator attaches to its response and
/// the catalog uses to learn adapter-proposed bindings (spec §4.I).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowObservabilityReport {
    pub nodes: Vec<NodeExecutionRecord>,
    pub edges: Vec<EdgeExecutionRecord>,
    pub adaptations: Vec<AdaptationRecord>,
    pub total_duration_ms: u64,
    pub total_nodes: u32,
    pub successful_count: u32,
    pub skipped_count: u32,
    pub failed_count: u32,
    pub fastest_node_ms: Option<u64>,
    pub slowest_node_ms: Option<u64>,
    pub median_node_ms: Option<u64>,
    pub average_node_ms: Option<f64>,
    pub edge_eval_count: u32,
    pub adaptation_count: u32,
}

struct EdgeStatus {
    resolved: bool,
    fired: bool,
}

/// Executes a [`WorkflowInstance`] against `ctx`, mutating it in place with
/// every node's outputs, and returns the observability report on success.
pub struct WorkflowExecutor {
    adapter: Option<Arc<dyn PortAdapterHook>>,
}

impl WorkflowExecutor {
    pub fn new() -> Self {
        Self { adapter: None }
    }

    pub fn with_adapter(adapter: Arc<dyn PortAdapterHook>) -> Self {
        Self { adapter: Some(adapter) }
    }

    #[tracing::instrument(skip(self, workflow, ctx), fields(workflow_id = %workflow.metamodel.id))]
    pub async fn execute(
        &self,
        workflow: &WorkflowInstance,
        ctx: &mut ExecutionContext,
    ) -> Result<WorkflowObservabilityReport> {
        let started_at = Instant::now();
        let metamodel = workflow.metamodel.clone();

        let mut states: HashMap<String, NodeState> =
            metamodel.nodes.iter().map(|n| (n.id.clone(), NodeState::Pending)).collect();
        let mut edge_status: HashMap<String, EdgeStatus> = metamodel
            .edges
            .iter()
            .map(|e| (e.id.clone(), EdgeStatus { resolved: false, fired: false }))
            .collect();

        let mut report = WorkflowObservabilityReport::default();
        let mut ready_queue: Vec<String> = Vec::new();

        for node in &metamodel.nodes {
            if metamodel.edges_into(&node.id).next().is_none() {
                states.insert(node.id.clone(), NodeState::Ready);
                ready_queue.push(node.id.clone());
            }
        }

        let concurrency = metamodel.nodes.len().clamp(1, 16);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        #[allow(clippy::type_complexity)]
        let mut in_flight: JoinSet<(String, Instant, DateTime<Utc>, Result<BTreeMap<String, Value>>)> =
            JoinSet::new();

        loop {
            while let Some(node_id) = ready_queue.pop() {
                if states.get(&node_id).copied() != Some(NodeState::Ready) {
                    continue;
                }
                let node = metamodel.node(&node_id).expect("ready node exists in metamodel");
                let node_instance = workflow.node_instance(&node_id)?;
                let input_snapshot = self.resolve_inputs(&node_id, node_instance.current_metamodel().as_ref(), ctx);

                let inputs = match self
                    .ensure_required_inputs(&node_id, node_instance.current_metamodel().as_ref(), input_snapshot, ctx, &mut report)
                    .await
                {
                    Ok(inputs) => inputs,
                    Err(err) => {
                        tracing::warn!(node_id = %node_id, error = %err, "node failed: unsatisfied inputs");
                        let now = Utc::now();
                        states.insert(node_id.clone(), NodeState::Failed);
                        report.nodes.push(NodeExecutionRecord {
                            node_id: node_id.clone(),
                            state: NodeState::Failed,
                            started_at: now,
                            ended_at: now,
                            duration_ms: 0,
                            success: false,
                            token_usage: None,
                            context_diff: ContextDiff::default(),
                            error: Some(err.to_string()),
                        });
                        Self::finalize(&mut report, started_at, &states);
                        return Err(err);
                    }
                };

                tracing::debug!(node_id = %node_id, "node running");
                states.insert(node_id.clone(), NodeState::Running);
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let node_id_clone = node_id.clone();
                in_flight.spawn(async move {
                    let start = Instant::now();
                    let started_at = Utc::now();
                    let outcome = node_instance.execute(&inputs).await;
                    drop(permit);
                    (node_id_clone, start, started_at, outcome)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (node_id, start, node_started_at, outcome) = joined.expect("executor task panicked");
            let duration_ms = start.elapsed().as_millis() as u64;
            let node_ended_at = Utc::now();

            match outcome {
                Ok(mut outputs) => {
                    let token_usage = outputs
                        .remove(TOKEN_USAGE_OUTPUT_KEY)
                        .and_then(|raw| serde_json::from_value::<TokenUsage>(raw).ok());

                    let before = ctx.as_value().clone();
                    for (key, value) in &outputs {
                        ctx.put(&format!("{node_id}.{key}"), value.clone());
                    }
                    let after = ctx.as_value().clone();

                    tracing::info!(node_id = %node_id, duration_ms, "node completed");
                    states.insert(node_id.clone(), NodeState::Completed);
                    report.nodes.push(NodeExecutionRecord {
                        node_id: node_id.clone(),
                        state: NodeState::Completed,
                        started_at: node_started_at,
                        ended_at: node_ended_at,
                        duration_ms,
                        success: true,
                        token_usage,
                        context_diff: ContextDiff::compute(&before, &after),
                        error: None,
                    });
                    self.resolve_outgoing_edges(&node_id, &metamodel, ctx, &mut edge_status, &mut report);
                    self.advance_targets(&node_id, &metamodel, &mut states, &mut edge_status, &mut ready_queue, &mut report);
                }
                Err(err) => {
                    tracing::warn!(node_id = %node_id, error = %err, "node failed");
                    states.insert(node_id.clone(), NodeState::Failed);
                    report.nodes.push(NodeExecutionRecord {
                        node_id: node_id.clone(),
                        state: NodeState::Failed,
                        started_at: node_started_at,
                        ended_at: node_ended_at,
                        duration_ms,
                        success: false,
                        token_usage: None,
                        context_diff: ContextDiff::default(),
                        error: Some(err.to_string()),
                    });
                    Self::finalize(&mut report, started_at, &states);
                    return Err(err);
                }
            }
        }

        Self::finalize(&mut report, started_at, &states);
        Ok(report)
    }

    fn resolve_inputs(&self, node_id: &str, metamodel: &NodeMetamodel, ctx: &ExecutionContext) -> NodeInputs {
        let mut inputs = NodeInputs::new();
        for port in metamodel.input_ports() {
            let mut value = ctx.get(&format!("{node_id}.{}", port.key));
            if value.is_null() {
                if let Some(default) = port.default_value.clone().or_else(|| port.schema.default_value().cloned()) {
                    value = default;
                }
            }
            inputs.insert(port.key.clone(), value);
        }
        inputs
    }

    async fn ensure_required_inputs(
        &self,
        node_id: &str,
        metamodel: &NodeMetamodel,
        mut inputs: NodeInputs,
        ctx: &mut ExecutionContext,
        report: &mut WorkflowObservabilityReport,
    ) -> Result<NodeInputs> {
        let missing: Vec<String> = metamodel
            .input_ports()
            .iter()
            .filter(|p| p.is_required())
            .filter(|p| inputs.get(&p.key).map(Value::is_null).unwrap_or(true))
            .map(|p| p.key.clone())
            .collect();

        if missing.is_empty() {
            return Ok(inputs);
        }

        let Some(adapter) = &self.adapter else {
            return Err(WorkflowError::UnsatisfiedInputs {
                node_id: node_id.to_string(),
                missing,
            });
        };

        let adapted = adapter.adapt(node_id, &missing, metamodel, ctx).await?;
        for (key, value) in &adapted {
            ctx.put(&format!("{node_id}.{key}"), value.clone());
            inputs.insert(key.clone(), value.clone());
        }

        let still_missing: Vec<String> = missing
            .iter()
            .filter(|key| inputs.get(*key).map(Value::is_null).unwrap_or(true))
            .cloned()
            .collect();

        report.adaptations.push(AdaptationRecord {
            node_id: node_id.to_string(),
            missing_inputs: missing,
            proposed_bindings: adapted,
            success: still_missing.is_empty(),
        });

        if still_missing.is_empty() {
            Ok(inputs)
        } else {
            Err(WorkflowError::UnsatisfiedInputs {
                node_id: node_id.to_string(),
                missing: still_missing,
            })
        }
    }

    /// Called once a node has completed: evaluates each outgoing edge's
    /// condition (an edge with no condition always fires), applies its
    /// bindings into the target's namespace when it fires, and records its
    /// resolved/fired status for the downstream JOIN/MERGE gating check.
    fn resolve_outgoing_edges(
        &self,
        node_id: &str,
        metamodel: &crate::metamodel::WorkflowMetamodel,
        ctx: &mut ExecutionContext,
        edge_status: &mut HashMap<String, EdgeStatus>,
        report: &mut WorkflowObservabilityReport,
    ) {
        let edges: Vec<_> = metamodel.edges_from(node_id).cloned().collect();
        for edge in edges {
            let fired = edge
                .condition
                .as_ref()
                .map(|cond| cond.evaluate(&|path| ctx.get(&format!("{node_id}.{path}"))))
                .unwrap_or(true);

            let mut applied_bindings = BTreeMap::new();
            if fired {
                for (source_path, target_key) in &edge.bindings {
                    let value = ctx.get(&format!("{node_id}.{source_path}"));
                    ctx.put(&format!("{}.{}", edge.target_node_id, target_key), value.clone());
                    applied_bindings.insert(target_key.clone(), value);
                }
            }

            edge_status.insert(edge.id.clone(), EdgeStatus { resolved: true, fired });
            report.edges.push(EdgeExecutionRecord {
                edge_id: edge.id.clone(),
                fired,
                applied_bindings,
            });
        }
    }

    fn advance_targets(
        &self,
        node_id: &str,
        metamodel: &crate::metamodel::WorkflowMetamodel,
        states: &mut HashMap<String, NodeState>,
        edge_status: &mut HashMap<String, EdgeStatus>,
        ready_queue: &mut Vec<String>,
        report: &mut WorkflowObservabilityReport,
    ) {
        let mut to_check: Vec<String> = metamodel.edges_from(node_id).map(|e| e.target_node_id.clone()).collect();
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(target_id) = to_check.pop() {
            if !visited.insert(target_id.clone()) {
                continue;
            }
            match states.get(&target_id).copied() {
                Some(NodeState::Pending) => {}
                _ => continue,
            }
            let Some(target_node) = metamodel.node(&target_id) else { continue };
            let incoming: Vec<_> = metamodel.edges_into(&target_id).collect();
            let all_resolved = incoming.iter().all(|e| edge_status.get(&e.id).map(|s| s.resolved).unwrap_or(false));
            let any_fired = incoming.iter().any(|e| edge_status.get(&e.id).map(|s| s.fired).unwrap_or(false));

            match target_node.execution_type {
                ExecutionType::Merge => {
                    if any_fired {
                        states.insert(target_id.clone(), NodeState::Ready);
                        ready_queue.push(target_id.clone());
                    }
                }
                ExecutionType::Join => {
                    if all_resolved {
                        if any_fired {
                            states.insert(target_id.clone(), NodeState::Ready);
                            ready_queue.push(target_id.clone());
                        } else {
                            tracing::debug!(node_id = %target_id, "node skipped: no incoming edge fired");
                            let now = Utc::now();
                            states.insert(target_id.clone(), NodeState::Skipped);
                            report.nodes.push(NodeExecutionRecord {
                                node_id: target_id.clone(),
                                state: NodeState::Skipped,
                                started_at: now,
                                ended_at: now,
                                duration_ms: 0,
                                success: false,
                                token_usage: None,
                                context_diff: ContextDiff::default(),
                                error: None,
                            });
                            // A skipped node's own outgoing edges resolve as
                            // not-fired so downstream JOINs don't wait forever
                            // on a branch that will never run; cascade onward.
                            for edge in metamodel.edges_from(&target_id) {
                                edge_status.insert(edge.id.clone(), EdgeStatus { resolved: true, fired: false });
                                report.edges.push(EdgeExecutionRecord {
                                    edge_id: edge.id.clone(),
                                    fired: false,
                                    applied_bindings: BTreeMap::new(),
                                });
                                to_check.push(edge.target_node_id.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    fn finalize(report: &mut WorkflowObservabilityReport, started_at: Instant, states: &HashMap<String, NodeState>) {
        report.total_duration_ms = started_at.elapsed().as_millis() as u64;
        report.total_nodes = states.len() as u32;
        report.successful_count = states.values().filter(|s| **s == NodeState::Completed).count() as u32;
        report.skipped_count = states.values().filter(|s| **s == NodeState::Skipped).count() as u32;
        report.failed_count = states.values().filter(|s| **s == NodeState::Failed).count() as u32;
        report.edge_eval_count = report.edges.len() as u32;
        report.adaptation_count = report.adaptations.len() as u32;

        let mut ran_durations: Vec<u64> = report
            .nodes
            .iter()
            .filter(|n| n.state == NodeState::Completed || n.state == NodeState::Failed)
            .map(|n| n.duration_ms)
            .collect();
        ran_durations.sort_unstable();

        report.fastest_node_ms = ran_durations.first().copied();
        report.slowest_node_ms = ran_durations.last().copied();
        report.average_node_ms = if ran_durations.is_empty() {
            None
        } else {
            Some(ran_durations.iter().sum::<u64>() as f64 / ran_durations.len() as f64)
        };
        report.median_node_ms = match ran_durations.len() {
            0 => None,
            len if len % 2 == 1 => Some(ran_durations[len / 2]),
            len => Some((ran_durations[len / 2 - 1] + ran_durations[len / 2]) / 2),
        };
    }
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new()
    }
}

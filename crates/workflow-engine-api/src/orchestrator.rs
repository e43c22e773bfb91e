//! # Orchestrator
//!
//! End-to-end glue (spec §4.I): detect an intent, route to a workflow,
//! map the request into the entry nodes' inputs, execute the DAG, then
//! reflect — persisting the adapter-learned bindings the executor already
//! flushed through the catalog during the run, and recording the
//! intent-workflow pairing's usage. Each stage short-circuits the next on
//! failure; the orchestrator never catches an inner error, only wraps it in
//! the structured envelope at the HTTP boundary.

use std::sync::Arc;

use rand::RngCore;
use serde_json::Value;
use uuid::Uuid;

use workflow_engine_core::context::ExecutionContext;
use workflow_engine_core::error::Result;
use workflow_engine_core::executor::{WorkflowExecutor, WorkflowObservabilityReport};
use workflow_engine_core::metamodel::WorkflowMetamodel;
use workflow_engine_core::node_instance::{InstancesRegistry, NodeInstance};
use workflow_engine_core::workflow_instance::{WorkflowInstance, WorkflowInstancesRegistry};
use workflow_engine_nodes::Providers;

use crate::catalog::Catalog;
use crate::input_mapper::InputMapper;
use crate::intent::{IntentDetector, Router};
use crate::port_adapter::PortAdapter;

/// One end-to-end orchestration request.
pub struct OrchestrationRequest {
    pub request_text: String,
    /// Sampling temperature for the router (spec §4.G); callers that don't
    /// care pass `1.0`.
    pub temperature: f64,
}

/// What the orchestrator hands back: the terminal context values at each
/// exit node plus the full observability report for the run.
pub struct OrchestrationResponse {
    pub workflow_id: String,
    pub intent_id: String,
    pub exit_values: serde_json::Map<String, Value>,
    pub report: WorkflowObservabilityReport,
}

/// Reinforcement applied to a handled-intent's router score after a run
/// that completed with no failed nodes. A small, fixed increment rather than
/// a learned step size — the spec asks for a score the router ranks by, not
/// a particular reinforcement schedule (see `DESIGN.md`).
const SCORE_REINFORCEMENT: f64 = 0.1;

pub struct Orchestrator {
    catalog: Arc<dyn Catalog>,
    instances: Arc<InstancesRegistry>,
    workflow_instances: Arc<WorkflowInstancesRegistry>,
    providers: Providers,
    detector: IntentDetector,
    router: Router,
    mapper: InputMapper,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        instances: Arc<InstancesRegistry>,
        workflow_instances: Arc<WorkflowInstancesRegistry>,
        providers: Providers,
        detector: IntentDetector,
        router: Router,
        mapper: InputMapper,
    ) -> Self {
        Self { catalog, instances, workflow_instances, providers, detector, router, mapper }
    }

    #[tracing::instrument(skip(self, request, rng), fields(request_len = request.request_text.len()))]
    pub async fn orchestrate(
        &self,
        request: OrchestrationRequest,
        rng: &mut dyn RngCore,
    ) -> Result<OrchestrationResponse> {
        let detected = self.detector.detect(&request.request_text).await?;
        tracing::info!(intent_id = %detected.intent_id, "intent detected");
        let workflow_id = self.router.route(&detected.intent_id, request.temperature, rng).await?;

        let workflow_metamodel = self.catalog.get_workflow(&workflow_id).await?;
        self.ensure_nodes_registered(&workflow_metamodel).await?;
        let workflow = self.resolve_workflow(&workflow_id, workflow_metamodel.clone()).await?;

        let mut ctx = ExecutionContext::new();
        for (key, value) in detected.user_variables {
            ctx.put(&key, value);
        }

        let mut entry_nodes = Vec::new();
        for node in workflow.entry_nodes() {
            let instance = workflow.node_instance(&node.id)?;
            let metamodel = (*instance.current_metamodel()).clone();
            entry_nodes.push((node.id.clone(), metamodel));
        }
        self.mapper.map(&mut ctx, &request.request_text, &entry_nodes).await?;

        let adapter = Arc::new(PortAdapter::new(
            self.providers.chat.clone(),
            self.catalog.clone(),
            Arc::new(workflow_metamodel),
        ));
        let executor = WorkflowExecutor::with_adapter(adapter);
        let report = executor.execute(&workflow, &mut ctx).await?;

        if report.failed_count == 0 {
            self.reflect(&workflow_id, &detected.intent_id).await?;
        }

        let mut exit_values = serde_json::Map::new();
        for node in workflow.exit_nodes() {
            exit_values.insert(node.id.clone(), ctx.get(&node.id));
        }

        Ok(OrchestrationResponse {
            workflow_id,
            intent_id: detected.intent_id,
            exit_values,
            report,
        })
    }

    /// Builds and registers a live [`NodeInstance`] for every node this
    /// workflow references that isn't already in the process-wide registry.
    /// Needed because the catalog, not the composition root, is the source
    /// of truth for which node metamodels exist — a node can be created at
    /// any time, including by the port adapter's own reflect step.
    async fn ensure_nodes_registered(&self, metamodel: &WorkflowMetamodel) -> Result<()> {
        for node in &metamodel.nodes {
            if self.instances.get(&node.node_metamodel_id).await.is_ok() {
                continue;
            }
            let node_metamodel = self.catalog.get_node(&node.node_metamodel_id).await?;
            let effector = workflow_engine_nodes::effector_for(&node_metamodel, &self.providers);
            let (instance, publisher) = NodeInstance::new(node_metamodel, effector);
            // A concurrent caller may have registered it first; either
            // outcome leaves the instance registered, which is all we need.
            let _ = self.instances.register(instance, publisher).await;
        }
        Ok(())
    }

    /// Serves a cached resolved instance when this workflow has already run
    /// once in this process, resolving and populating the cache otherwise.
    async fn resolve_workflow(
        &self,
        workflow_id: &str,
        metamodel: workflow_engine_core::metamodel::WorkflowMetamodel,
    ) -> Result<Arc<WorkflowInstance>> {
        if let Ok(cached) = self.workflow_instances.get(workflow_id).await {
            return Ok(cached);
        }
        let resolved = WorkflowInstance::resolve(metamodel, &self.instances).await?;
        // A concurrent caller may have registered the same id between our
        // cache miss and this point; either outcome already satisfies us, so
        // a registration conflict here is not itself an error.
        let _ = self.workflow_instances.register(workflow_id, resolved).await;
        self.workflow_instances.get(workflow_id).await
    }

    /// Reflect stage: reinforces the handled-intent score the router reads,
    /// closing the feedback loop described in spec §4.I.
    async fn reflect(&self, workflow_id: &str, intent_id: &str) -> Result<()> {
        let mut workflow = self.catalog.get_workflow(workflow_id).await?;
        if let Some(handled) = workflow.handled_intents.iter_mut().find(|hi| hi.intent_id == intent_id) {
            handled.score += SCORE_REINFORCEMENT;
            handled.last_executed = Some(chrono::Utc::now());
        }
        self.catalog.update_workflow(workflow).await
    }
}

pub fn new_observation_id() -> String {
    Uuid::new_v4().to_string()
}

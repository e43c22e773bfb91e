//! # Node Instances
//!
//! A [`NodeInstance`] is the runtime wrapper around a [`NodeMetamodel`] that dispatches
//! to a concrete [`Effector`]. It replaces the teacher's `RwLock<HashMap<TypeId, Box<dyn
//! Node>>>` registry keyed on Rust types with a metamodel-id-keyed, async equivalent —
//! effector implementations live in `workflow-engine-nodes` and are resolved at
//! registration time, not at compile time.
//!
//! Metamodel hot-reload (spec §9 design note "replace event listeners with a small
//! publish/subscribe channel per metamodel id") is implemented with a
//! [`tokio::sync::watch`] channel: updating a node's metamodel publishes a new `Arc`
//! without blocking effectors mid-call, which continue to observe the metamodel they
//! started with.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{watch, RwLock};

use crate::error::{Result, WorkflowError};
use crate::metamodel::NodeMetamodel;

/// The inputs available to an effector call: the resolved value at each of
/// the node's input port keys, already validated and adapted by the
/// executor/port-adapter before the effector ever runs.
pub type NodeInputs = BTreeMap<String, Value>;

/// The outputs an effector call produces, keyed by output port key. The
/// executor — not the effector — writes these into the shared
/// [`crate::context::ExecutionContext`], preserving the invariant that a
/// running effector never mutates context directly (spec §5.iii).
pub type NodeOutputs = BTreeMap<String, Value>;

/// The seam every concrete node kind (LLM, Embeddings, VectorDb, Rest,
/// Gateway) implements. `workflow-engine-nodes` provides the real
/// implementations; tests substitute fakes.
#[async_trait]
pub trait Effector: Send + Sync {
    async fn execute(&self, metamodel: &NodeMetamodel, inputs: &NodeInputs) -> Result<NodeOutputs>;
}

/// Runtime pairing of a metamodel (hot-swappable) and the effector that
/// executes it.
pub struct NodeInstance {
    id: String,
    metamodel_rx: watch::Receiver<Arc<NodeMetamodel>>,
    effector: Box<dyn Effector>,
}

impl NodeInstance {
    pub fn new(metamodel: NodeMetamodel, effector: Box<dyn Effector>) -> (Self, NodeMetamodelPublisher) {
        let id = metamodel.id().to_string();
        let (tx, rx) = watch::channel(Arc::new(metamodel));
        (
            Self {
                id,
                metamodel_rx: rx,
                effector,
            },
            NodeMetamodelPublisher { tx },
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The metamodel currently in effect. In-flight calls hold their own
    /// clone taken at invocation time, so a concurrent update never changes
    /// the view of a call already running.
    pub fn current_metamodel(&self) -> Arc<NodeMetamodel> {
        self.metamodel_rx.borrow().clone()
    }

    pub async fn execute(&self, inputs: &NodeInputs) -> Result<NodeOutputs> {
        let metamodel = self.current_metamodel();
        self.effector.execute(&metamodel, inputs).await
    }
}

/// Handle used to publish metamodel updates to a [`NodeInstance`]'s
/// subscribers. Held by the [`InstancesRegistry`], not by the instance
/// itself, so registration and update are separate, auditable operations.
pub struct NodeMetamodelPublisher {
    tx: watch::Sender<Arc<NodeMetamodel>>,
}

impl NodeMetamodelPublisher {
    pub fn publish(&self, metamodel: NodeMetamodel) {
        let _ = self.tx.send(Arc::new(metamodel));
    }
}

/// Process-wide registry of live [`NodeInstance`]s, keyed by metamodel id.
/// Registration is compare-and-swap: registering an id that already exists
/// is an error, matching the teacher's `NodeRegistry` double-registration
/// guard.
#[derive(Default)]
pub struct InstancesRegistry {
    instances: RwLock<BTreeMap<String, (Arc<NodeInstance>, NodeMetamodelPublisher)>>,
}

impl InstancesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, instance: NodeInstance, publisher: NodeMetamodelPublisher) -> Result<()> {
        if instance.id().is_empty() {
            return Err(WorkflowError::RegistryError {
                message: "cannot register a node instance with an empty id".into(),
            });
        }
        let mut guard = self.instances.write().await;
        if guard.contains_key(instance.id()) {
            return Err(WorkflowError::RegistryError {
                message: format!("node instance '{}' is already registered", instance.id()),
            });
        }
        guard.insert(instance.id().to_string(), (Arc::new(instance), publisher));
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Arc<NodeInstance>> {
        let guard = self.instances.read().await;
        guard
            .get(id)
            .map(|(instance, _)| instance.clone())
            .ok_or_else(|| WorkflowError::NodeNotFound { node_id: id.to_string() })
    }

    /// Publishes an updated metamodel to the node instance registered under
    /// `id`, without disturbing the effector it is paired with.
    pub async fn update_metamodel(&self, id: &str, metamodel: NodeMetamodel) -> Result<()> {
        let guard = self.instances.read().await;
        let (_, publisher) = guard
            .get(id)
            .ok_or_else(|| WorkflowError::NodeNotFound { node_id: id.to_string() })?;
        publisher.publish(metamodel);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut guard = self.instances.write().await;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| WorkflowError::NodeNotFound { node_id: id.to_string() })
    }

    pub async fn clear(&self) {
        self.instances.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }
}

//! # Workflow Instances
//!
//! A [`WorkflowInstance`] is a [`WorkflowMetamodel`] resolved against the
//! [`crate::node_instance::InstancesRegistry`]: every [`WorkflowNode`] is paired with the
//! live [`NodeInstance`] it names, and the DAG has already been validated acyclic with no
//! dangling edges. The [`WorkflowExecutor`](crate::executor::WorkflowExecutor) runs
//! against a `WorkflowInstance`, never against the raw metamodel.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Result, WorkflowError};
use crate::metamodel::{WorkflowMetamodel, WorkflowNode};
use crate::node_instance::{InstancesRegistry, NodeInstance};

/// A resolved, executable workflow: the declarative metamodel plus the live
/// node instance cached for each of its nodes.
pub struct WorkflowInstance {
    pub metamodel: Arc<WorkflowMetamodel>,
    node_instances: BTreeMap<String, Arc<NodeInstance>>,
}

impl WorkflowInstance {
    /// Validates `metamodel` (acyclic, no dangling edges) and resolves every
    /// node against `registry`, failing with `NodeNotFound` if any node
    /// metamodel id is not currently registered.
    pub async fn resolve(metamodel: WorkflowMetamodel, registry: &InstancesRegistry) -> Result<Self> {
        metamodel.validate_acyclic()?;
        metamodel.validate_no_dangling_edges()?;

        let mut node_instances = BTreeMap::new();
        for node in &metamodel.nodes {
            let instance = registry.get(&node.node_metamodel_id).await?;
            node_instances.insert(node.id.clone(), instance);
        }

        Ok(Self {
            metamodel: Arc::new(metamodel),
            node_instances,
        })
    }

    pub fn node_instance(&self, workflow_node_id: &str) -> Result<Arc<NodeInstance>> {
        self.node_instances
            .get(workflow_node_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NodeNotFound {
                node_id: workflow_node_id.to_string(),
            })
    }

    pub fn entry_nodes(&self) -> Vec<&WorkflowNode> {
        let entry_ids = self.metamodel.entry_node_ids();
        self.metamodel
            .nodes
            .iter()
            .filter(|n| entry_ids.contains(&n.id.as_str()))
            .collect()
    }

    pub fn exit_nodes(&self) -> Vec<&WorkflowNode> {
        let exit_ids = self.metamodel.exit_node_ids();
        self.metamodel
            .nodes
            .iter()
            .filter(|n| exit_ids.contains(&n.id.as_str()))
            .collect()
    }
}

/// Process-wide registry of resolved [`WorkflowInstance`]s, keyed by
/// workflow metamodel id. Mirrors [`InstancesRegistry`]'s CAS semantics.
#[derive(Default)]
pub struct WorkflowInstancesRegistry {
    instances: RwLock<BTreeMap<String, Arc<WorkflowInstance>>>,
}

impl WorkflowInstancesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: impl Into<String>, instance: WorkflowInstance) -> Result<()> {
        let id = id.into();
        if id.is_empty() {
            return Err(WorkflowError::RegistryError {
                message: "cannot register a workflow instance with an empty id".into(),
            });
        }
        let mut guard = self.instances.write().await;
        if guard.contains_key(&id) {
            return Err(WorkflowError::RegistryError {
                message: format!("workflow instance '{id}' is already registered"),
            });
        }
        guard.insert(id, Arc::new(instance));
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Arc<WorkflowInstance>> {
        let guard = self.instances.read().await;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NodeNotFound { node_id: id.to_string() })
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metamodel::{ExecutionType, Version, WorkflowEdge};
    use crate::node_instance::{Effector, NodeInputs, NodeOutputs};
    use crate::metamodel::{NodeMetamodel, NodeMetamodelHeader, QuantitativeDescriptor};
    use async_trait::async_trait;
    use chrono::Utc;

    struct EchoEffector;

    #[async_trait]
    impl Effector for EchoEffector {
        async fn execute(&self, _metamodel: &NodeMetamodel, inputs: &NodeInputs) -> Result<NodeOutputs> {
            Ok(inputs.clone())
        }
    }

    fn gateway_metamodel(id: &str) -> NodeMetamodel {
        NodeMetamodel::Gateway {
            header: NodeMetamodelHeader {
                id: id.to_string(),
                family_id: "gateway".into(),
                version: Version::new(1, 0, 0),
                is_latest: true,
                enabled: true,
                name: id.to_string(),
                description: "".into(),
                author: "test".into(),
                qualitative_descriptor: "".into(),
                quantitative_descriptor: QuantitativeDescriptor {
                    expected_latency_ms: 1,
                    cost_weight: 0.0,
                },
                embedding: vec![],
                input_ports: vec![],
                output_ports: vec![],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    fn sample_workflow() -> WorkflowMetamodel {
        WorkflowMetamodel {
            id: "wf1".into(),
            version: Version::new(1, 0, 0),
            name: "sample".into(),
            enabled: true,
            nodes: vec![
                WorkflowNode {
                    id: "a".into(),
                    node_metamodel_id: "nm-a".into(),
                    execution_type: ExecutionType::Join,
                },
                WorkflowNode {
                    id: "b".into(),
                    node_metamodel_id: "nm-b".into(),
                    execution_type: ExecutionType::Join,
                },
            ],
            edges: vec![WorkflowEdge {
                id: "e1".into(),
                source_node_id: "a".into(),
                target_node_id: "b".into(),
                bindings: BTreeMap::new(),
                condition: None,
            }],
            handled_intents: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolve_caches_a_node_instance_per_workflow_node() {
        let registry = InstancesRegistry::new();
        for id in ["nm-a", "nm-b"] {
            let (instance, _publisher) = NodeInstance::new(gateway_metamodel(id), Box::new(EchoEffector));
            registry.register(instance, _publisher).await.unwrap();
        }

        let instance = WorkflowInstance::resolve(sample_workflow(), &registry).await.unwrap();
        assert_eq!(instance.node_instance("a").unwrap().id(), "nm-a");
        assert_eq!(instance.entry_nodes().len(), 1);
        assert_eq!(instance.exit_nodes().len(), 1);
    }

    #[tokio::test]
    async fn resolve_fails_when_a_node_metamodel_is_unregistered() {
        let registry = InstancesRegistry::new();
        let result = WorkflowInstance::resolve(sample_workflow(), &registry).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn workflow_instances_registry_rejects_double_registration() {
        let registry = InstancesRegistry::new();
        for id in ["nm-a", "nm-b"] {
            let (instance, publisher) = NodeInstance::new(gateway_metamodel(id), Box::new(EchoEffector));
            registry.register(instance, publisher).await.unwrap();
        }
        let resolved = WorkflowInstance::resolve(sample_workflow(), &registry).await.unwrap();

        let workflows = WorkflowInstancesRegistry::new();
        workflows.register("wf1", resolved).await.unwrap();

        let registry2 = InstancesRegistry::new();
        for id in ["nm-a", "nm-b"] {
            let (instance, publisher) = NodeInstance::new(gateway_metamodel(id), Box::new(EchoEffector));
            registry2.register(instance, publisher).await.unwrap();
        }
        let resolved2 = WorkflowInstance::resolve(sample_workflow(), &registry2).await.unwrap();
        assert!(workflows.register("wf1", resolved2).await.is_err());
    }
}

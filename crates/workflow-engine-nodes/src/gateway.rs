//! # Gateway Effector
//!
//! `Gateway` nodes carry no external call of their own — they exist purely as
//! JOIN/MERGE control-flow points in a workflow graph (fan-in convergence,
//! branch reconciliation). The effector's only job is to make whatever values
//! already reached its input ports available under its output ports, so that
//! downstream bindings can read from the gateway node itself rather than
//! reaching back through it to an upstream node.

use async_trait::async_trait;
use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::metamodel::NodeMetamodel;
use workflow_engine_core::node_instance::{Effector, NodeInputs, NodeOutputs};

pub struct GatewayEffector;

impl GatewayEffector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GatewayEffector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Effector for GatewayEffector {
    async fn execute(&self, metamodel: &NodeMetamodel, inputs: &NodeInputs) -> Result<NodeOutputs> {
        let NodeMetamodel::Gateway { .. } = metamodel else {
            return Err(WorkflowError::Validation {
                message: "GatewayEffector invoked with a non-Gateway metamodel".into(),
            });
        };
        Ok(inputs.clone())
    }
}

//! # Embeddings Effector
//!
//! Reads the `InputText` port, calls the configured [`EmbeddingClient`], and writes the
//! resulting vector to the `OutputVector` port.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use workflow_engine_core::error::retry::{retry_with_backoff, RetryPolicy};
use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::metamodel::NodeMetamodel;
use workflow_engine_core::node_instance::{Effector, NodeInputs, NodeOutputs};
use workflow_engine_core::port::{EmbeddingsPortRole, PortRole};

use crate::providers::EmbeddingClient;

pub struct EmbeddingsEffector {
    client: Arc<dyn EmbeddingClient>,
    retry_policy: RetryPolicy,
}

impl EmbeddingsEffector {
    pub fn new(client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            client,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Effector for EmbeddingsEffector {
    async fn execute(&self, metamodel: &NodeMetamodel, inputs: &NodeInputs) -> Result<NodeOutputs> {
        let NodeMetamodel::Embeddings { header, .. } = metamodel else {
            return Err(WorkflowError::Validation {
                message: "EmbeddingsEffector invoked with a non-Embeddings metamodel".into(),
            });
        };

        let input_key = header
            .input_ports
            .iter()
            .find(|p| matches!(p.role, PortRole::Embeddings(EmbeddingsPortRole::InputText)))
            .map(|p| p.key.as_str())
            .ok_or_else(|| WorkflowError::Validation {
                message: format!("embeddings node '{}' declares no InputText port", header.id),
            })?;
        let output_key = header
            .output_ports
            .iter()
            .find(|p| matches!(p.role, PortRole::Embeddings(EmbeddingsPortRole::OutputVector)))
            .map(|p| p.key.as_str())
            .ok_or_else(|| WorkflowError::Validation {
                message: format!("embeddings node '{}' declares no OutputVector port", header.id),
            })?;

        let text = inputs.get(input_key).and_then(Value::as_str).unwrap_or_default().to_string();
        let client = self.client.clone();
        let vector = retry_with_backoff(self.retry_policy, || {
            let client = client.clone();
            let text = text.clone();
            async move { client.embed(&text).await }
        })
        .await?;

        let mut outputs = NodeOutputs::new();
        outputs.insert(
            output_key.to_string(),
            Value::Array(vector.into_iter().map(|f| Value::from(f as f64)).collect()),
        );
        Ok(outputs)
    }
}

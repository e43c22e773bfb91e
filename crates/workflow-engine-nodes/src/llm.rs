//! # LLM Effector
//!
//! Renders the node's `system_prompt_template` against the bound `SystemPromptVariable`
//! input ports, sends the `UserPrompt` input to the configured [`ChatClient`], and writes
//! the completion to the node's `Response` output port. When the `Response` output port
//! declares a non-`STRING` schema, the completion is coerced via
//! [`generate_structured_output`] instead of written verbatim.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::Value;
use workflow_engine_core::error::retry::{retry_with_backoff, RetryPolicy};
use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::executor::{TokenUsage, TOKEN_USAGE_OUTPUT_KEY};
use workflow_engine_core::metamodel::NodeMetamodel;
use workflow_engine_core::node_instance::{Effector, NodeInputs, NodeOutputs};
use workflow_engine_core::port::{LlmPortRole, PortRole};
use workflow_engine_core::schema::PortSchema;

use crate::providers::ChatClient;
use crate::structured_output::generate_structured_output;

/// Effector for `NodeMetamodel::Llm` nodes.
pub struct LlmEffector {
    chat: Arc<dyn ChatClient>,
    retry_policy: RetryPolicy,
}

impl LlmEffector {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self {
            chat,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Effector for LlmEffector {
    async fn execute(&self, metamodel: &NodeMetamodel, inputs: &NodeInputs) -> Result<NodeOutputs> {
        let NodeMetamodel::Llm {
            header,
            system_prompt_template,
            parameters,
            ..
        } = metamodel
        else {
            return Err(WorkflowError::Validation {
                message: "LlmEffector invoked with a non-LLM metamodel".into(),
            });
        };

        let mut template_vars: BTreeMap<String, Value> = BTreeMap::new();
        let mut user_prompt_parts: Vec<String> = Vec::new();
        let mut response_port: Option<(&str, &PortSchema)> = None;

        for port in &header.input_ports {
            if let PortRole::Llm(LlmPortRole::SystemPromptVariable) = port.role {
                template_vars.insert(port.key.clone(), inputs.get(&port.key).cloned().unwrap_or(Value::Null));
            }
            if let PortRole::Llm(LlmPortRole::UserPrompt) = port.role {
                if let Some(part) = inputs.get(&port.key).and_then(Value::as_str) {
                    user_prompt_parts.push(part.to_string());
                }
            }
        }
        // Multiple `UserPrompt` ports concatenate (spec §4.C) rather than
        // the last-bound one winning.
        let user_prompt = user_prompt_parts.join("\n");
        for port in &header.output_ports {
            if let PortRole::Llm(LlmPortRole::Response) = port.role {
                response_port = Some((port.key.as_str(), &port.schema));
            }
        }
        let (response_key, response_schema) = response_port.ok_or_else(|| WorkflowError::Validation {
            message: format!("LLM node '{}' declares no Response output port", header.id),
        })?;

        let handlebars = Handlebars::new();
        let system_prompt = handlebars
            .render_template(system_prompt_template, &template_vars)
            .map_err(|e| WorkflowError::Validation {
                message: format!("system prompt template render failed: {e}"),
            })?;

        let (value, usage): (Value, Option<TokenUsage>) = if matches!(response_schema, PortSchema::String { .. }) {
            let chat = self.chat.clone();
            let system_prompt = system_prompt.clone();
            let user_prompt = user_prompt.clone();
            let temperature = parameters.temperature;
            let max_tokens = parameters.max_tokens;
            let completion = retry_with_backoff(self.retry_policy, || {
                let chat = chat.clone();
                let system_prompt = system_prompt.clone();
                let user_prompt = user_prompt.clone();
                async move { chat.complete(&system_prompt, &user_prompt, temperature, max_tokens).await }
            })
            .await?;
            (Value::String(completion.text), completion.usage)
        } else {
            generate_structured_output(
                self.chat.as_ref(),
                &system_prompt,
                &user_prompt,
                response_schema,
                parameters.temperature,
                parameters.max_tokens,
            )
            .await?
        };

        let mut outputs = NodeOutputs::new();
        outputs.insert(response_key.to_string(), value);
        if let Some(usage) = usage {
            outputs.insert(TOKEN_USAGE_OUTPUT_KEY.to_string(), serde_json::to_value(usage).expect("TokenUsage serializes"));
        }
        Ok(outputs)
    }
}

//! # Input Mapper
//!
//! Populates the entry nodes' required input ports from the raw request text
//! (spec §4.H). Proposed bindings are applied to a scratch copy of the
//! context first; they are only merged into the real context if every entry
//! node's required inputs end up satisfied, keeping the operation all-or-
//! nothing from the orchestrator's point of view.

use std::sync::Arc;

use serde_json::Value;

use workflow_engine_core::context::ExecutionContext;
use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::metamodel::NodeMetamodel;
use workflow_engine_nodes::structured_output::describe_shape;
use workflow_engine_nodes::ChatClient;

pub struct InputMapper {
    chat: Arc<dyn ChatClient>,
}

impl InputMapper {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }

    /// `entry_nodes` pairs each entry node's workflow id with its metamodel.
    /// On success, `ctx` is mutated in place with the merged bindings; on
    /// failure `ctx` is left untouched.
    pub async fn map(
        &self,
        ctx: &mut ExecutionContext,
        request_text: &str,
        entry_nodes: &[(String, NodeMetamodel)],
    ) -> Result<()> {
        let system_prompt = self.build_prompt(entry_nodes);
        let user_prompt = format!("Request: {request_text}");

        let raw = self.chat.complete(&system_prompt, &user_prompt, 0.0, 512).await?.text;
        let bindings = Self::parse_bindings(&raw);

        let mut scratch = ctx.deep_copy();
        for (path, value) in bindings {
            if value.is_object() || value.is_array() {
                tracing::warn!(path = %path, "input mapper ignored a non-scalar binding");
                continue;
            }
            scratch.put(&path, value);
        }

        let missing = Self::missing_required_inputs(&scratch, entry_nodes);
        if !missing.is_empty() {
            return Err(WorkflowError::InsufficientInputs { missing });
        }

        *ctx = scratch;
        Ok(())
    }

    fn build_prompt(&self, entry_nodes: &[(String, NodeMetamodel)]) -> String {
        let mut required: Vec<String> = Vec::new();
        for (node_id, metamodel) in entry_nodes {
            for port in metamodel.input_ports() {
                if port.is_required() {
                    required.push(format!("  \"{node_id}.{}\": {}", port.key, describe_shape(&port.schema)));
                }
            }
        }
        format!(
            "You are populating the initial inputs for a workflow from a user's request. \
             These required input ports need values:\n{}\n\n\
             Respond with a single JSON object `{{\"bindings\": {{\"<nodeId>.<portKey>\": <scalar value>}}}}`. \
             Only primitive scalars (strings, numbers, booleans) are allowed as values; \
             express nested structure with more dotted keys, never as a JSON object or array value.",
            required.join("\n")
        )
    }

    fn parse_bindings(raw: &str) -> Vec<(String, Value)> {
        let Some(value) = workflow_engine_nodes::structured_output::extract_first_json_value(raw) else {
            return Vec::new();
        };
        let Some(bindings) = value.get("bindings").and_then(Value::as_object) else {
            return Vec::new();
        };
        bindings.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn missing_required_inputs(ctx: &ExecutionContext, entry_nodes: &[(String, NodeMetamodel)]) -> Vec<String> {
        let mut missing = Vec::new();
        for (node_id, metamodel) in entry_nodes {
            for port in metamodel.input_ports() {
                if !port.is_required() {
                    continue;
                }
                let path = format!("{node_id}.{}", port.key);
                let value = ctx.get(&path);
                if !port.schema.is_valid_value(&value) {
                    missing.push(path);
                }
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use workflow_engine_core::metamodel::{NodeMetamodelHeader, QuantitativeDescriptor, Version};
    use workflow_engine_core::port::{LlmPortRole, Port, PortRole};
    use workflow_engine_core::schema::PortSchemaBuilder;
    use workflow_engine_nodes::providers::{ChatCompletion, MockChatClient};

    fn llm_node(id: &str) -> NodeMetamodel {
        NodeMetamodel::Llm {
            header: NodeMetamodelHeader {
                id: id.to_string(),
                family_id: "llm".into(),
                version: Version::new(1, 0, 0),
                is_latest: true,
                enabled: true,
                name: id.to_string(),
                description: "".into(),
                author: "test".into(),
                qualitative_descriptor: "".into(),
                quantitative_descriptor: QuantitativeDescriptor { expected_latency_ms: 10, cost_weight: 0.0 },
                embedding: vec![],
                input_ports: vec![Port::new(
                    "destination",
                    PortSchemaBuilder::string().build().unwrap(),
                    PortRole::Llm(LlmPortRole::UserPrompt),
                )],
                output_ports: vec![],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            provider: "anthropic".into(),
            model_name: "claude".into(),
            system_prompt_template: "".into(),
            parameters: workflow_engine_core::metamodel::LlmParameters { temperature: 0.2, max_tokens: 256 },
        }
    }

    #[tokio::test]
    async fn map_merges_bindings_when_all_required_inputs_are_satisfied() {
        let mut chat = MockChatClient::new();
        chat.expect_complete().times(1).returning(|_, _, _, _| {
            Box::pin(async { Ok(ChatCompletion::text_only(json!({"bindings": {"a.destination": "Paris"}}).to_string())) })
        });

        let mapper = InputMapper::new(Arc::new(chat));
        let mut ctx = ExecutionContext::new();
        let entry_nodes = vec![("a".to_string(), llm_node("nm-a"))];

        mapper.map(&mut ctx, "book a flight to paris", &entry_nodes).await.unwrap();
        assert_eq!(ctx.get("a.destination"), json!("Paris"));
    }

    #[tokio::test]
    async fn map_leaves_context_untouched_and_fails_when_required_input_is_missing() {
        let mut chat = MockChatClient::new();
        chat.expect_complete()
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(ChatCompletion::text_only(json!({"bindings": {}}).to_string())) }));

        let mapper = InputMapper::new(Arc::new(chat));
        let mut ctx = ExecutionContext::new();
        let entry_nodes = vec![("a".to_string(), llm_node("nm-a"))];

        let result = mapper.map(&mut ctx, "something vague", &entry_nodes).await;
        assert!(matches!(result, Err(WorkflowError::InsufficientInputs { .. })));
        assert_eq!(ctx.get("a.destination"), Value::Null);
    }

    #[tokio::test]
    async fn map_ignores_non_scalar_bindings() {
        let mut chat = MockChatClient::new();
        chat.expect_complete().times(1).returning(|_, _, _, _| {
            Box::pin(async { Ok(ChatCompletion::text_only(json!({"bindings": {"a.destination": {"nested": true}}}).to_string())) })
        });

        let mapper = InputMapper::new(Arc::new(chat));
        let mut ctx = ExecutionContext::new();
        let entry_nodes = vec![("a".to_string(), llm_node("nm-a"))];

        let result = mapper.map(&mut ctx, "vague", &entry_nodes).await;
        assert!(matches!(result, Err(WorkflowError::InsufficientInputs { .. })));
    }
}

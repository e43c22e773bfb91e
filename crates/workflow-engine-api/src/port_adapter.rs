//! # Port Adapter
//!
//! Implements [`PortAdapterHook`], the seam the executor calls when a READY
//! node still has null required inputs after default values have been
//! applied (spec §4.F). Builds a prompt describing the target's unsatisfied
//! input schemas and the candidate source nodes' output schemas, asks an
//! LLM for a `{bindings: {"<sourceNodeId>.<sourcePortPath>": "<targetPortPath>"}}`
//! object, validates it against the port/schema model, and — on success —
//! both resolves the concrete values the executor needs and persists the
//! learned bindings back onto the originating edges through the catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use workflow_engine_core::context::ExecutionContext;
use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::executor::PortAdapterHook;
use workflow_engine_core::metamodel::{NodeMetamodel, WorkflowMetamodel};
use workflow_engine_core::port::Port;
use workflow_engine_nodes::structured_output::{describe_shape, extract_first_json_value};
use workflow_engine_nodes::ChatClient;

use crate::catalog::Catalog;

/// One (source path, target path) pair the LLM proposed, after it has
/// passed all four validation checks in spec §4.F.
struct ValidatedBinding {
    source_node_id: String,
    source_path: String,
    target_path: String,
}

pub struct PortAdapter {
    chat: Arc<dyn ChatClient>,
    catalog: Arc<dyn Catalog>,
    workflow: Arc<WorkflowMetamodel>,
}

impl PortAdapter {
    pub fn new(chat: Arc<dyn ChatClient>, catalog: Arc<dyn Catalog>, workflow: Arc<WorkflowMetamodel>) -> Self {
        Self { chat, catalog, workflow }
    }

    fn find_port<'a>(ports: &'a [Port], root_key: &str) -> Option<&'a Port> {
        ports.iter().find(|p| p.key == root_key)
    }

    /// Splits a dotted path into its leading port key and the remaining
    /// sub-path (empty if the path addresses the port as a whole).
    fn split_path(path: &str) -> (&str, &str) {
        match path.split_once('.') {
            Some((head, rest)) => (head, rest),
            None => (path, ""),
        }
    }

    fn resolve_schema<'a>(ports: &'a [Port], path: &str) -> Option<&'a workflow_engine_core::schema::PortSchema> {
        let (root, rest) = Self::split_path(path);
        let port = Self::find_port(ports, root)?;
        port.schema.schema_by_path(rest).ok()
    }

    async fn source_metamodels(&self, target_node_id: &str) -> BTreeMap<String, NodeMetamodel> {
        let mut sources = BTreeMap::new();
        let mut seen = std::collections::BTreeSet::new();
        for edge in self.workflow.edges_into(target_node_id) {
            if !seen.insert(edge.source_node_id.clone()) {
                continue;
            }
            let Some(workflow_node) = self.workflow.node(&edge.source_node_id) else { continue };
            match self.catalog.get_node(&workflow_node.node_metamodel_id).await {
                Ok(metamodel) => {
                    sources.insert(edge.source_node_id.clone(), metamodel);
                }
                Err(err) => {
                    tracing::warn!(source = %edge.source_node_id, error = %err, "adapter could not resolve source node metamodel");
                }
            }
        }
        sources
    }

    fn build_prompt(
        target_node_id: &str,
        target_metamodel: &NodeMetamodel,
        missing_keys: &[String],
        sources: &BTreeMap<String, NodeMetamodel>,
    ) -> (String, String) {
        let target_shapes: Vec<String> = missing_keys
            .iter()
            .filter_map(|key| {
                Self::find_port(target_metamodel.input_ports(), key)
                    .map(|p| format!("  \"{key}\": {}", describe_shape(&p.schema)))
            })
            .collect();

        let mut source_shapes = String::new();
        for (source_id, metamodel) in sources {
            source_shapes.push_str(&format!("source node \"{source_id}\" output ports:\n"));
            for port in metamodel.output_ports() {
                source_shapes.push_str(&format!("  \"{}\": {}\n", port.key, describe_shape(&port.schema)));
            }
        }

        let system_prompt = format!(
            "You are assisting a workflow orchestration engine in binding port values. \
             The target node \"{target_node_id}\" has unsatisfied required input ports:\n{}\n\n\
             {source_shapes}\n\
             Respond with a single JSON object `{{\"bindings\": {{\"<sourceNodeId>.<sourcePortPath>\": \"<targetPortPath>\"}}}}` \
             mapping each unsatisfied input to a compatible source output. Every key listed above must be covered.",
            target_shapes.join("\n")
        );
        let user_prompt = "Propose the bindings now.".to_string();
        (system_prompt, user_prompt)
    }

    fn parse_and_validate(
        &self,
        raw: &str,
        target_node_id: &str,
        target_metamodel: &NodeMetamodel,
        missing_keys: &[String],
        sources: &BTreeMap<String, NodeMetamodel>,
    ) -> std::result::Result<Vec<ValidatedBinding>, String> {
        let value = extract_first_json_value(raw).ok_or_else(|| "no JSON object found in response".to_string())?;
        let bindings = value
            .get("bindings")
            .and_then(Value::as_object)
            .ok_or_else(|| "response missing a \"bindings\" object".to_string())?;

        let mut validated = Vec::new();
        for (source_key, target_value) in bindings {
            let target_path = target_value
                .as_str()
                .ok_or_else(|| format!("target path for '{source_key}' is not a string"))?;
            let (source_node_id, source_path) = source_key
                .split_once('.')
                .ok_or_else(|| format!("source key '{source_key}' is not of the form '<nodeId>.<path>'"))?;

            let source_metamodel = sources
                .get(source_node_id)
                .ok_or_else(|| format!("'{source_node_id}' is not a candidate source node for {target_node_id}"))?;

            let target_schema = Self::resolve_schema(target_metamodel.input_ports(), target_path)
                .ok_or_else(|| format!("unknown target path '{target_path}'"))?;
            let source_schema = Self::resolve_schema(source_metamodel.output_ports(), source_path)
                .ok_or_else(|| format!("unknown source path '{source_path}' on '{source_node_id}'"))?;

            if !source_schema.is_compatible(target_schema) {
                return Err(format!(
                    "source '{source_node_id}.{source_path}' is not schema-compatible with target '{target_path}'"
                ));
            }

            validated.push(ValidatedBinding {
                source_node_id: source_node_id.to_string(),
                source_path: source_path.to_string(),
                target_path: target_path.to_string(),
            });
        }

        let uncovered: Vec<&String> = missing_keys
            .iter()
            .filter(|key| !validated.iter().any(|b| Self::split_path(&b.target_path).0 == key.as_str()))
            .collect();
        if !uncovered.is_empty() {
            return Err(format!("no binding covers required input(s) {uncovered:?}"));
        }

        Ok(validated)
    }

    /// Assembles final port values from validated bindings by replaying them
    /// onto a scratch context: a binding targeting `"profile.name"` and one
    /// targeting `"profile.age"` merge into a single `profile` object, the
    /// same way the executor composes edge bindings into a port's namespace.
    fn resolve_values(
        &self,
        ctx: &ExecutionContext,
        missing_keys: &[String],
        validated: &[ValidatedBinding],
    ) -> BTreeMap<String, Value> {
        let mut scratch = ExecutionContext::new();
        for binding in validated {
            let value = ctx.get(&format!("{}.{}", binding.source_node_id, binding.source_path));
            scratch.put(&binding.target_path, value);
        }

        let mut resolved = BTreeMap::new();
        for key in missing_keys {
            let value = scratch.get(key);
            if !value.is_null() {
                resolved.insert(key.clone(), value);
            }
        }
        resolved
    }

    async fn persist(&self, target_node_id: &str, validated: &[ValidatedBinding]) {
        if validated.is_empty() {
            return;
        }
        let mut updated = (*self.workflow).clone();
        for binding in validated {
            if let Some(edge) = updated
                .edges
                .iter_mut()
                .find(|e| e.target_node_id == target_node_id && e.source_node_id == binding.source_node_id)
            {
                edge.bindings.insert(binding.source_path.clone(), binding.target_path.clone());
            }
        }
        if let Err(err) = self.catalog.update_workflow(updated).await {
            tracing::warn!(error = %err, "failed to persist adapter-learned binding");
        }
    }
}

#[async_trait]
impl PortAdapterHook for PortAdapter {
    #[tracing::instrument(skip(self, node_metamodel, ctx), fields(node_id, missing = missing_keys.len()))]
    async fn adapt(
        &self,
        node_id: &str,
        missing_keys: &[String],
        node_metamodel: &NodeMetamodel,
        ctx: &ExecutionContext,
    ) -> Result<BTreeMap<String, Value>> {
        let sources = self.source_metamodels(node_id).await;
        if sources.is_empty() {
            return Err(WorkflowError::AdaptationFailed {
                node_id: node_id.to_string(),
                reason: "no candidate source nodes feed this node's incoming edges".to_string(),
            });
        }

        let (system_prompt, user_prompt) = Self::build_prompt(node_id, node_metamodel, missing_keys, &sources);

        let raw = self.chat.complete(&system_prompt, &user_prompt, 0.0, 512).await?.text;
        let attempt = self.parse_and_validate(&raw, node_id, node_metamodel, missing_keys, &sources);

        let validated = match attempt {
            Ok(validated) => validated,
            Err(first_reason) => {
                let critique = format!(
                    "Your previous proposal was invalid: {first_reason}. \
                     Respond again with a corrected JSON object of the same shape."
                );
                let retry_raw = self.chat.complete(&system_prompt, &critique, 0.0, 512).await?.text;
                match self.parse_and_validate(&retry_raw, node_id, node_metamodel, missing_keys, &sources) {
                    Ok(validated) => validated,
                    Err(second_reason) => {
                        return Err(WorkflowError::AdaptationFailed {
                            node_id: node_id.to_string(),
                            reason: second_reason,
                        });
                    }
                }
            }
        };

        self.persist(node_id, &validated).await;
        Ok(self.resolve_values(ctx, missing_keys, &validated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalog;
    use chrono::Utc;
    use serde_json::json;
    use workflow_engine_core::metamodel::{
        ExecutionType, NodeMetamodelHeader, QuantitativeDescriptor, Version, WorkflowEdge, WorkflowNode,
    };
    use workflow_engine_core::port::{EmbeddingsPortRole, PortRole, VectorDbPortRole};
    use workflow_engine_core::schema::PortSchemaBuilder;
    use workflow_engine_nodes::providers::{ChatCompletion, MockChatClient};

    fn embeddings_node(id: &str) -> NodeMetamodel {
        NodeMetamodel::Embeddings {
            header: NodeMetamodelHeader {
                id: id.to_string(),
                family_id: "embeddings".into(),
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
                    "text",
                    PortSchemaBuilder::string().build().unwrap(),
                    PortRole::Embeddings(EmbeddingsPortRole::InputText),
                )],
                output_ports: vec![Port::new(
                    "vector",
                    PortSchemaBuilder::array(PortSchemaBuilder::float().build().unwrap()).build().unwrap(),
                    PortRole::Embeddings(EmbeddingsPortRole::OutputVector),
                )],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    fn vector_db_node(id: &str) -> NodeMetamodel {
        NodeMetamodel::VectorDb {
            header: NodeMetamodelHeader {
                id: id.to_string(),
                family_id: "vector_db".into(),
                version: Version::new(1, 0, 0),
                is_latest: true,
                enabled: true,
                name: id.to_string(),
                description: "".into(),
                author: "test".into(),
                qualitative_descriptor: "".into(),
                quantitative_descriptor: QuantitativeDescriptor { expected_latency_ms: 20, cost_weight: 0.0 },
                embedding: vec![],
                input_ports: vec![Port::new(
                    "vector",
                    PortSchemaBuilder::array(PortSchemaBuilder::float().build().unwrap()).build().unwrap(),
                    PortRole::VectorDb(VectorDbPortRole::InputVector),
                )],
                output_ports: vec![],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            uri: "mongodb://localhost".into(),
            database_name: "db".into(),
            collection_name: "coll".into(),
            index_name: "idx".into(),
            vector_field: "embedding".into(),
            limit: 5,
            similarity_threshold: 0.5,
        }
    }

    fn workflow_with_edge() -> WorkflowMetamodel {
        WorkflowMetamodel {
            id: "wf".into(),
            version: Version::new(1, 0, 0),
            name: "rag".into(),
            enabled: true,
            nodes: vec![
                WorkflowNode { id: "e".into(), node_metamodel_id: "nm-e".into(), execution_type: ExecutionType::Join },
                WorkflowNode { id: "v".into(), node_metamodel_id: "nm-v".into(), execution_type: ExecutionType::Join },
            ],
            edges: vec![WorkflowEdge {
                id: "edge-e-v".into(),
                source_node_id: "e".into(),
                target_node_id: "v".into(),
                bindings: BTreeMap::new(),
                condition: None,
            }],
            handled_intents: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn adapt_resolves_a_compatible_binding_and_persists_it() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_get_node()
            .withf(|id| id == "nm-e")
            .returning(|_| Ok(embeddings_node("nm-e")));
        catalog
            .expect_update_workflow()
            .times(1)
            .returning(|_| Ok(()));

        let mut chat = MockChatClient::new();
        chat.expect_complete().times(1).returning(|_, _, _, _| {
            Box::pin(async { Ok(ChatCompletion::text_only(json!({"bindings": {"e.vector": "vector"}}).to_string())) })
        });

        let adapter = PortAdapter::new(Arc::new(chat), Arc::new(catalog), Arc::new(workflow_with_edge()));

        let mut ctx = ExecutionContext::new();
        ctx.put("e.vector", json!([0.1, 0.2, 0.3]));

        let target = vector_db_node("nm-v");
        let missing = vec!["vector".to_string()];
        let resolved = adapter.adapt("v", &missing, &target, &ctx).await.unwrap();

        assert_eq!(resolved.get("vector"), Some(&json!([0.1, 0.2, 0.3])));
    }

    #[tokio::test]
    async fn adapt_fails_after_two_invalid_attempts() {
        let mut catalog = MockCatalog::new();
        catalog.expect_get_node().returning(|_| Ok(embeddings_node("nm-e")));

        let mut chat = MockChatClient::new();
        chat.expect_complete()
            .times(2)
            .returning(|_, _, _, _| Box::pin(async { Ok(ChatCompletion::text_only("not json")) }));

        let adapter = PortAdapter::new(Arc::new(chat), Arc::new(catalog), Arc::new(workflow_with_edge()));
        let ctx = ExecutionContext::new();
        let target = vector_db_node("nm-v");
        let missing = vec!["vector".to_string()];

        let result = adapter.adapt("v", &missing, &target, &ctx).await;
        assert!(matches!(result, Err(WorkflowError::AdaptationFailed { .. })));
    }

    #[tokio::test]
    async fn adapt_fails_immediately_with_no_candidate_sources() {
        let catalog = MockCatalog::new();
        let chat = MockChatClient::new();
        let workflow = WorkflowMetamodel {
            id: "wf".into(),
            version: Version::new(1, 0, 0),
            name: "isolated".into(),
            enabled: true,
            nodes: vec![WorkflowNode { id: "v".into(), node_metamodel_id: "nm-v".into(), execution_type: ExecutionType::Join }],
            edges: vec![],
            handled_intents: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let adapter = PortAdapter::new(Arc::new(chat), Arc::new(catalog), Arc::new(workflow));
        let ctx = ExecutionContext::new();
        let target = vector_db_node("nm-v");
        let missing = vec!["vector".to_string()];

        let result = adapter.adapt("v", &missing, &target, &ctx).await;
        assert!(matches!(result, Err(WorkflowError::AdaptationFailed { .. })));
    }

    #[test]
    fn split_path_separates_root_and_remainder() {
        assert_eq!(PortAdapter::split_path("vector"), ("vector", ""));
        assert_eq!(PortAdapter::split_path("profile.name"), ("profile", "name"));
    }
}

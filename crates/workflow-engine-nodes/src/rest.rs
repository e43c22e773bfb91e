//! # REST Effector
//!
//! Assembles an outbound HTTP request from the node's `RequestBodyField`,
//! `RequestHeader`, `RequestPathVariable`, and `RequestQueryVariable` input
//! ports, executes it via the configured [`HttpExecutor`], and scatters the
//! response back out across `ResponseBodyField` and `ResponseStatus` output
//! ports. Retries with exponential backoff on transient (5xx, timeout)
//! failures, per spec §5.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use workflow_engine_core::context::ExecutionContext;
use workflow_engine_core::error::retry::{retry_with_backoff, RetryPolicy};
use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::metamodel::NodeMetamodel;
use workflow_engine_core::node_instance::{Effector, NodeInputs, NodeOutputs};
use workflow_engine_core::port::{PortRole, RestPortRole};

use crate::providers::HttpExecutor;

pub struct RestEffector {
    executor: Arc<dyn HttpExecutor>,
    retry_policy: RetryPolicy,
}

impl RestEffector {
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            executor,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Effector for RestEffector {
    async fn execute(&self, metamodel: &NodeMetamodel, inputs: &NodeInputs) -> Result<NodeOutputs> {
        let NodeMetamodel::Rest {
            header, service_uri, method, headers, ..
        } = metamodel
        else {
            return Err(WorkflowError::Validation {
                message: "RestEffector invoked with a non-Rest metamodel".into(),
            });
        };

        let mut url = service_uri.clone();
        let mut query_params: Vec<(String, String)> = Vec::new();
        let mut request_headers = headers.clone();
        // `RequestBodyField` ports address the body with dotted paths
        // (`"profile.name"`), so a scratch context is used to nest them into
        // a single JSON object the same way `ExecutionContext::put` nests
        // any other dotted path, rather than keeping them as sibling keys.
        let mut body_ctx = ExecutionContext::new();
        let mut has_body_fields = false;

        for port in &header.input_ports {
            let value = inputs.get(&port.key).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                continue;
            }
            match port.role {
                PortRole::Rest(RestPortRole::RequestPathVariable) => {
                    let placeholder = format!("{{{}}}", port.key);
                    let replacement = value.as_str().map(str::to_string).unwrap_or(value.to_string());
                    url = url.replace(&placeholder, &replacement);
                }
                PortRole::Rest(RestPortRole::RequestQueryVariable) => {
                    let rendered = value.as_str().map(str::to_string).unwrap_or(value.to_string());
                    query_params.push((port.key.clone(), rendered));
                }
                PortRole::Rest(RestPortRole::RequestHeader) => {
                    let rendered = value.as_str().map(str::to_string).unwrap_or(value.to_string());
                    request_headers.insert(port.key.clone(), rendered);
                }
                PortRole::Rest(RestPortRole::RequestBodyField) => {
                    body_ctx.put(&port.key, value);
                    has_body_fields = true;
                }
                _ => {}
            }
        }

        if !query_params.is_empty() {
            let query = query_params
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{url}?{query}");
        }

        let body = if has_body_fields { Some(body_ctx.as_value().clone()) } else { None };

        let executor = self.executor.clone();
        let method = *method;
        let response = retry_with_backoff(self.retry_policy, || {
            let executor = executor.clone();
            let url = url.clone();
            let request_headers = request_headers.clone();
            let body = body.clone();
            async move { executor.execute(method, &url, &request_headers, body).await }
        })
        .await?;

        let mut outputs = NodeOutputs::new();
        for port in &header.output_ports {
            match port.role {
                PortRole::Rest(RestPortRole::ResponseStatus) => {
                    outputs.insert(port.key.clone(), Value::from(response.status));
                }
                PortRole::Rest(RestPortRole::ResponseBodyField) => {
                    let value = response.body.get(&port.key).cloned().unwrap_or(Value::Null);
                    outputs.insert(port.key.clone(), value);
                }
                _ => {}
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockHttpExecutor;
    use crate::providers::HttpResponse;
    use chrono::Utc;
    use serde_json::json;
    use workflow_engine_core::metamodel::{HttpMethod, NodeMetamodelHeader, QuantitativeDescriptor, Version};
    use workflow_engine_core::port::Port;
    use workflow_engine_core::schema::PortSchemaBuilder;

    fn rest_metamodel() -> NodeMetamodel {
        NodeMetamodel::Rest {
            header: NodeMetamodelHeader {
                id: "rest-1".into(),
                family_id: "tool.rest".into(),
                version: Version::new(1, 0, 0),
                is_latest: true,
                enabled: true,
                name: "get user".into(),
                description: "".into(),
                author: "test".into(),
                qualitative_descriptor: "".into(),
                quantitative_descriptor: QuantitativeDescriptor { expected_latency_ms: 200, cost_weight: 0.2 },
                embedding: vec![],
                input_ports: vec![Port::new(
                    "user_id",
                    PortSchemaBuilder::string().build().unwrap(),
                    PortRole::Rest(RestPortRole::RequestPathVariable),
                )],
                output_ports: vec![
                    Port::new(
                        "status",
                        PortSchemaBuilder::int().build().unwrap(),
                        PortRole::Rest(RestPortRole::ResponseStatus),
                    ),
                    Port::new(
                        "name",
                        PortSchemaBuilder::string().required(false).build().unwrap(),
                        PortRole::Rest(RestPortRole::ResponseBodyField),
                    ),
                ],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            service_uri: "https://api.example.com/users/{user_id}".into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn substitutes_path_variable_and_scatters_response() {
        let mut executor = MockHttpExecutor::new();
        executor
            .expect_execute()
            .withf(|_, url, _, _| url == "https://api.example.com/users/42")
            .times(1)
            .returning(|_, _, _, _| {
                Box::pin(async { Ok(HttpResponse { status: 200, body: json!({"name": "ada"}) }) })
            });

        let effector = RestEffector::new(Arc::new(executor));
        let mut inputs = NodeInputs::new();
        inputs.insert("user_id".into(), Value::from("42"));

        let outputs = effector.execute(&rest_metamodel(), &inputs).await.unwrap();
        assert_eq!(outputs.get("status"), Some(&Value::from(200)));
        assert_eq!(outputs.get("name"), Some(&Value::from("ada")));
    }

    fn rest_metamodel_with_nested_body() -> NodeMetamodel {
        NodeMetamodel::Rest {
            header: NodeMetamodelHeader {
                id: "rest-2".into(),
                family_id: "tool.rest".into(),
                version: Version::new(1, 0, 0),
                is_latest: true,
                enabled: true,
                name: "create user".into(),
                description: "".into(),
                author: "test".into(),
                qualitative_descriptor: "".into(),
                quantitative_descriptor: QuantitativeDescriptor { expected_latency_ms: 200, cost_weight: 0.2 },
                embedding: vec![],
                input_ports: vec![
                    Port::new(
                        "profile.name",
                        PortSchemaBuilder::string().build().unwrap(),
                        PortRole::Rest(RestPortRole::RequestBodyField),
                    ),
                    Port::new(
                        "profile.age",
                        PortSchemaBuilder::int().build().unwrap(),
                        PortRole::Rest(RestPortRole::RequestBodyField),
                    ),
                ],
                output_ports: vec![Port::new(
                    "status",
                    PortSchemaBuilder::int().build().unwrap(),
                    PortRole::Rest(RestPortRole::ResponseStatus),
                )],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            service_uri: "https://api.example.com/users".into(),
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn dotted_body_field_keys_nest_into_a_single_object() {
        let mut executor = MockHttpExecutor::new();
        executor
            .expect_execute()
            .withf(|_, _, _, body| body == &Some(json!({"profile": {"name": "ada", "age": 30}})))
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(HttpResponse { status: 201, body: Value::Null }) }));

        let effector = RestEffector::new(Arc::new(executor));
        let mut inputs = NodeInputs::new();
        inputs.insert("profile.name".into(), Value::from("ada"));
        inputs.insert("profile.age".into(), Value::from(30));

        let outputs = effector.execute(&rest_metamodel_with_nested_body(), &inputs).await.unwrap();
        assert_eq!(outputs.get("status"), Some(&Value::from(201)));
    }
}

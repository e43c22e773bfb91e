//! # Vector-DB Effector
//!
//! Reads the `InputVector` port, runs an ANN search against the configured
//! [`VectorDatabase`], and writes the ranked matches to `Results` (and the
//! single best match to `FirstResult`, when that port is declared). Per spec
//! §5, vector-db effectors do not retry on failure.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::metamodel::NodeMetamodel;
use workflow_engine_core::node_instance::{Effector, NodeInputs, NodeOutputs};
use workflow_engine_core::port::{PortRole, VectorDbPortRole};

use crate::providers::VectorDatabase;

pub struct VectorDbEffector {
    database: Arc<dyn VectorDatabase>,
}

impl VectorDbEffector {
    pub fn new(database: Arc<dyn VectorDatabase>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Effector for VectorDbEffector {
    async fn execute(&self, metamodel: &NodeMetamodel, inputs: &NodeInputs) -> Result<NodeOutputs> {
        let NodeMetamodel::VectorDb {
            header,
            collection_name,
            limit,
            similarity_threshold,
            ..
        } = metamodel
        else {
            return Err(WorkflowError::Validation {
                message: "VectorDbEffector invoked with a non-VectorDb metamodel".into(),
            });
        };

        let input_key = header
            .input_ports
            .iter()
            .find(|p| matches!(p.role, PortRole::VectorDb(VectorDbPortRole::InputVector)))
            .map(|p| p.key.as_str())
            .ok_or_else(|| WorkflowError::Validation {
                message: format!("vector-db node '{}' declares no InputVector port", header.id),
            })?;

        let vector: Vec<f32> = inputs
            .get(input_key)
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())
            .unwrap_or_default();

        let results = self
            .database
            .search(collection_name, &vector, *limit, *similarity_threshold)
            .await?;

        let mut outputs = NodeOutputs::new();
        for port in &header.output_ports {
            match port.role {
                PortRole::VectorDb(VectorDbPortRole::Results) => {
                    let array = results
                        .iter()
                        .map(|r| json!({"id": r.id, "score": r.score, "payload": r.payload}))
                        .collect();
                    outputs.insert(port.key.clone(), Value::Array(array));
                }
                PortRole::VectorDb(VectorDbPortRole::FirstResult) => {
                    let first = results
                        .first()
                        .map(|r| json!({"id": r.id, "score": r.score, "payload": r.payload}))
                        .unwrap_or(Value::Null);
                    outputs.insert(port.key.clone(), first);
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
    use crate::providers::{MockVectorDatabase, VectorSearchResult};
    use chrono::Utc;
    use workflow_engine_core::metamodel::{NodeMetamodelHeader, QuantitativeDescriptor, Version};
    use workflow_engine_core::port::Port;
    use workflow_engine_core::schema::PortSchemaBuilder;
    use std::collections::BTreeMap;

    fn vector_db_metamodel() -> NodeMetamodel {
        NodeMetamodel::VectorDb {
            header: NodeMetamodelHeader {
                id: "vdb-1".into(),
                family_id: "tool.vector_db".into(),
                version: Version::new(1, 0, 0),
                is_latest: true,
                enabled: true,
                name: "doc search".into(),
                description: "".into(),
                author: "test".into(),
                qualitative_descriptor: "".into(),
                quantitative_descriptor: QuantitativeDescriptor { expected_latency_ms: 50, cost_weight: 0.1 },
                embedding: vec![],
                input_ports: vec![Port::new(
                    "query_vector",
                    PortSchemaBuilder::array(PortSchemaBuilder::float().build().unwrap()).build().unwrap(),
                    PortRole::VectorDb(VectorDbPortRole::InputVector),
                )],
                output_ports: vec![
                    Port::new(
                        "results",
                        PortSchemaBuilder::array(PortSchemaBuilder::object(BTreeMap::new()).build().unwrap())
                            .required(false)
                            .build()
                            .unwrap(),
                        PortRole::VectorDb(VectorDbPortRole::Results),
                    ),
                    Port::new(
                        "first",
                        PortSchemaBuilder::object(BTreeMap::new()).required(false).build().unwrap(),
                        PortRole::VectorDb(VectorDbPortRole::FirstResult),
                    ),
                ],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            uri: "mongodb://localhost".into(),
            database_name: "docs".into(),
            collection_name: "chunks".into(),
            index_name: "vector_index".into(),
            vector_field: "embedding".into(),
            limit: 5,
            similarity_threshold: 0.7,
        }
    }

    #[tokio::test]
    async fn populates_results_and_first_result_ports() {
        let mut database = MockVectorDatabase::new();
        database.expect_search().times(1).returning(|_, _, _, _| {
            Box::pin(async {
                Ok(vec![VectorSearchResult { id: "doc-1".into(), score: 0.9, payload: json!({"text": "a"}) }])
            })
        });

        let effector = VectorDbEffector::new(Arc::new(database));
        let mut inputs = NodeInputs::new();
        inputs.insert("query_vector".into(), Value::Array(vec![Value::from(0.1), Value::from(0.2)]));

        let outputs = effector.execute(&vector_db_metamodel(), &inputs).await.unwrap();
        assert_eq!(outputs.get("results").unwrap().as_array().unwrap().len(), 1);
        assert_eq!(outputs.get("first").unwrap()["id"], json!("doc-1"));
    }
}

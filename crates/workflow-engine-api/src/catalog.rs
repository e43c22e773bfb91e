//! # Catalog
//!
//! Persistence abstraction for intents, node metamodels, and workflow
//! metamodels (spec §6 "Catalog surface"). Mirrors the teacher's
//! `AgentRegistry` (`registry/agent_registry.rs`): a narrow `#[async_trait]`
//! trait with no concrete Postgres/Mongo implementation shipped alongside it
//! — a Mongo-backed driver is explicitly out of scope (spec §1) and belongs
//! to the application layer. [`InMemoryCatalog`] is the reference
//! implementation used by tests and the composition root.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::metamodel::{IntentMetamodel, NodeMetamodel, WorkflowMetamodel};

use crate::retrieval::Retrieval;

/// CRUD + listing for intents, nodes, and workflows, plus the family-scoped
/// and search-scoped queries the router, port adapter, and intent detector
/// rely on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_intent(&self, id: &str) -> Result<IntentMetamodel>;
    async fn create_intent(&self, intent: IntentMetamodel) -> Result<()>;
    /// Vector search over `intents.embedding` (spec §6 index list).
    async fn search_intents(&self, embedding: &[f32], top_k: usize) -> Result<Vec<IntentMetamodel>>;

    async fn get_node(&self, id: &str) -> Result<NodeMetamodel>;
    async fn create_node(&self, node: NodeMetamodel) -> Result<()>;
    /// The current `isLatest=true` metamodel in `family_id`, if the family
    /// has any members.
    async fn latest_by_family_id(&self, family_id: &str) -> Result<Option<NodeMetamodel>>;
    /// Every version in `family_id`, newest first.
    async fn all_by_family_order_by_version_desc(&self, family_id: &str) -> Result<Vec<NodeMetamodel>>;
    /// Full-text + vector hybrid search over nodes (spec §6).
    async fn search_nodes(&self, query_text: &str, embedding: &[f32], top_k: usize) -> Result<Vec<NodeMetamodel>>;

    async fn get_workflow(&self, id: &str) -> Result<WorkflowMetamodel>;
    async fn create_workflow(&self, workflow: WorkflowMetamodel) -> Result<()>;
    /// Overwrites a workflow metamodel wholesale — used by the orchestrator
    /// to flush adapter-learned edge bindings and updated handled-intent
    /// scores (spec §4.F/§4.I).
    async fn update_workflow(&self, workflow: WorkflowMetamodel) -> Result<()>;
    /// Enabled workflows declaring `intent_id` as a handled intent, sorted
    /// by that handled-intent's score descending (spec §4.G routing input).
    async fn enabled_workflows_for_intent(&self, intent_id: &str) -> Result<Vec<WorkflowMetamodel>>;
}

/// In-memory reference [`Catalog`], keyed by id. Search methods delegate
/// ranking to an injected [`Retrieval`] collaborator rather than duplicating
/// similarity scoring here.
pub struct InMemoryCatalog {
    retrieval: std::sync::Arc<dyn Retrieval>,
    intents: RwLock<BTreeMap<String, IntentMetamodel>>,
    nodes: RwLock<BTreeMap<String, NodeMetamodel>>,
    workflows: RwLock<BTreeMap<String, WorkflowMetamodel>>,
}

impl InMemoryCatalog {
    pub fn new(retrieval: std::sync::Arc<dyn Retrieval>) -> Self {
        Self {
            retrieval,
            intents: RwLock::new(BTreeMap::new()),
            nodes: RwLock::new(BTreeMap::new()),
            workflows: RwLock::new(BTreeMap::new()),
        }
    }

    fn not_found(kind: &str, id: &str) -> WorkflowError {
        WorkflowError::Catalog {
            message: format!("{kind} '{id}' not found"),
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_intent(&self, id: &str) -> Result<IntentMetamodel> {
        self.intents
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found("intent", id))
    }

    async fn create_intent(&self, intent: IntentMetamodel) -> Result<()> {
        self.intents.write().unwrap().insert(intent.id.clone(), intent);
        Ok(())
    }

    async fn search_intents(&self, embedding: &[f32], top_k: usize) -> Result<Vec<IntentMetamodel>> {
        let intents = self.intents.read().unwrap();
        let candidates: Vec<(String, Vec<f32>)> =
            intents.values().map(|i| (i.id.clone(), i.embedding.clone())).collect();
        let ranked = self.retrieval.rank_by_embedding(embedding, &candidates, top_k).await?;
        Ok(ranked
            .into_iter()
            .filter_map(|m| intents.get(&m.id).cloned())
            .collect())
    }

    async fn get_node(&self, id: &str) -> Result<NodeMetamodel> {
        self.nodes
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found("node", id))
    }

    async fn create_node(&self, node: NodeMetamodel) -> Result<()> {
        self.nodes.write().unwrap().insert(node.id().to_string(), node);
        Ok(())
    }

    async fn latest_by_family_id(&self, family_id: &str) -> Result<Option<NodeMetamodel>> {
        Ok(self
            .nodes
            .read()
            .unwrap()
            .values()
            .find(|n| n.header().family_id == family_id && n.header().is_latest)
            .cloned())
    }

    async fn all_by_family_order_by_version_desc(&self, family_id: &str) -> Result<Vec<NodeMetamodel>> {
        let mut matches: Vec<NodeMetamodel> = self
            .nodes
            .read()
            .unwrap()
            .values()
            .filter(|n| n.header().family_id == family_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.header().version.cmp(&a.header().version));
        Ok(matches)
    }

    async fn search_nodes(&self, query_text: &str, embedding: &[f32], top_k: usize) -> Result<Vec<NodeMetamodel>> {
        let nodes = self.nodes.read().unwrap();
        let vector_candidates: Vec<(String, Vec<f32>)> =
            nodes.values().map(|n| (n.id().to_string(), n.header().embedding.clone())).collect();
        let text_candidates: Vec<(String, String)> = nodes
            .values()
            .map(|n| {
                (
                    n.id().to_string(),
                    format!(
                        "{} {} {} {}",
                        n.header().name,
                        n.header().description,
                        n.header().author,
                        n.header().qualitative_descriptor
                    ),
                )
            })
            .collect();

        let by_vector = self.retrieval.rank_by_embedding(embedding, &vector_candidates, top_k).await?;
        let by_text = self.retrieval.rank_by_text(query_text, &text_candidates, top_k).await?;

        let mut combined: BTreeMap<String, f64> = BTreeMap::new();
        for m in by_vector.into_iter().chain(by_text) {
            *combined.entry(m.id).or_insert(0.0) += m.score;
        }
        let mut ranked: Vec<(String, f64)> = combined.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        Ok(ranked.into_iter().filter_map(|(id, _)| nodes.get(&id).cloned()).collect())
    }

    async fn get_workflow(&self, id: &str) -> Result<WorkflowMetamodel> {
        self.workflows
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found("workflow", id))
    }

    async fn create_workflow(&self, workflow: WorkflowMetamodel) -> Result<()> {
        self.workflows.write().unwrap().insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn update_workflow(&self, workflow: WorkflowMetamodel) -> Result<()> {
        self.workflows.write().unwrap().insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn enabled_workflows_for_intent(&self, intent_id: &str) -> Result<Vec<WorkflowMetamodel>> {
        let mut matches: Vec<WorkflowMetamodel> = self
            .workflows
            .read()
            .unwrap()
            .values()
            .filter(|w| w.enabled && w.handled_intent(intent_id).is_some())
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            let score_a = a.handled_intent(intent_id).map(|hi| hi.score).unwrap_or(0.0);
            let score_b = b.handled_intent(intent_id).map(|hi| hi.score).unwrap_or(0.0);
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::InMemoryRetrieval;
    use chrono::Utc;
    use std::sync::Arc;
    use workflow_engine_core::metamodel::{HandledIntent, NodeMetamodelHeader, QuantitativeDescriptor, Version};

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(Arc::new(InMemoryRetrieval::new()))
    }

    fn intent(id: &str, embedding: Vec<f32>) -> IntentMetamodel {
        IntentMetamodel {
            id: id.to_string(),
            name: id.to_string(),
            description: format!("intent {id}"),
            ai_generated: false,
            embedding,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn gateway_node(id: &str, family: &str, version: Version, is_latest: bool) -> NodeMetamodel {
        NodeMetamodel::Gateway {
            header: NodeMetamodelHeader {
                id: id.to_string(),
                family_id: family.to_string(),
                version,
                is_latest,
                enabled: true,
                name: id.to_string(),
                description: "".into(),
                author: "test".into(),
                qualitative_descriptor: "".into(),
                quantitative_descriptor: QuantitativeDescriptor { expected_latency_ms: 1, cost_weight: 0.0 },
                embedding: vec![],
                input_ports: vec![],
                output_ports: vec![],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    fn workflow(id: &str, handled: Vec<HandledIntent>) -> WorkflowMetamodel {
        WorkflowMetamodel {
            id: id.to_string(),
            version: Version::new(1, 0, 0),
            name: id.to_string(),
            enabled: true,
            nodes: vec![],
            edges: vec![],
            handled_intents: handled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_get_intent_round_trips() {
        let catalog = catalog();
        catalog.create_intent(intent("book_flight", vec![0.1, 0.2])).await.unwrap();
        let fetched = catalog.get_intent("book_flight").await.unwrap();
        assert_eq!(fetched.name, "book_flight");
    }

    #[tokio::test]
    async fn get_missing_intent_is_a_catalog_error() {
        let catalog = catalog();
        assert!(matches!(catalog.get_intent("missing").await, Err(WorkflowError::Catalog { .. })));
    }

    #[tokio::test]
    async fn latest_by_family_id_finds_only_the_latest_version() {
        let catalog = catalog();
        catalog.create_node(gateway_node("n1", "fam", Version::new(1, 0, 0), false)).await.unwrap();
        catalog.create_node(gateway_node("n2", "fam", Version::new(1, 1, 0), true)).await.unwrap();

        let latest = catalog.latest_by_family_id("fam").await.unwrap().unwrap();
        assert_eq!(latest.id(), "n2");
    }

    #[tokio::test]
    async fn all_by_family_order_by_version_desc_sorts_newest_first() {
        let catalog = catalog();
        catalog.create_node(gateway_node("n1", "fam", Version::new(1, 0, 0), false)).await.unwrap();
        catalog.create_node(gateway_node("n2", "fam", Version::new(2, 0, 0), true)).await.unwrap();
        catalog.create_node(gateway_node("n3", "fam", Version::new(1, 5, 0), false)).await.unwrap();

        let ordered = catalog.all_by_family_order_by_version_desc("fam").await.unwrap();
        let ids: Vec<&str> = ordered.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["n2", "n3", "n1"]);
    }

    #[tokio::test]
    async fn enabled_workflows_for_intent_sorts_by_score_descending() {
        let catalog = catalog();
        catalog
            .create_workflow(workflow(
                "w-low",
                vec![HandledIntent { intent_id: "book".into(), score: 0.2, last_executed: None }],
            ))
            .await
            .unwrap();
        catalog
            .create_workflow(workflow(
                "w-high",
                vec![HandledIntent { intent_id: "book".into(), score: 0.9, last_executed: None }],
            ))
            .await
            .unwrap();
        catalog
            .create_workflow(workflow(
                "w-other",
                vec![HandledIntent { intent_id: "unrelated".into(), score: 1.0, last_executed: None }],
            ))
            .await
            .unwrap();

        let matches = catalog.enabled_workflows_for_intent("book").await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["w-high", "w-low"]);
    }

    #[tokio::test]
    async fn search_intents_ranks_by_embedding_similarity() {
        let catalog = catalog();
        catalog.create_intent(intent("close", vec![1.0, 0.0])).await.unwrap();
        catalog.create_intent(intent("far", vec![0.0, 1.0])).await.unwrap();

        let results = catalog.search_intents(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "close");
    }
}

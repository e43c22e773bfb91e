//! # Workflow Engine Nodes
//!
//! Concrete [`Effector`](workflow_engine_core::node_instance::Effector)
//! implementations for each [`NodeMetamodel`](workflow_engine_core::metamodel::NodeMetamodel)
//! variant — LLM, Embeddings, VectorDb, Rest, and Gateway — plus the provider
//! seams (`ChatClient`, `EmbeddingClient`, `VectorDatabase`, `HttpExecutor`)
//! they call through to reach external collaborators.

pub mod embeddings;
pub mod gateway;
pub mod llm;
pub mod providers;
pub mod rest;
pub mod structured_output;
pub mod vector_db;

use std::sync::Arc;

use workflow_engine_core::metamodel::NodeMetamodel;
use workflow_engine_core::node_instance::Effector;

pub use embeddings::EmbeddingsEffector;
pub use gateway::GatewayEffector;
pub use llm::LlmEffector;
pub use providers::{
    AnthropicChatClient, ChatClient, ChatCompletion, EmbeddingClient, HttpExecutor, InMemoryVectorDatabase,
    OpenAiEmbeddingClient, ReqwestExecutor, VectorDatabase,
};
pub use rest::RestEffector;
pub use vector_db::VectorDbEffector;

/// The set of provider collaborators a composition root wires up once and
/// shares across every node instance built via [`effector_for`].
#[derive(Clone)]
pub struct Providers {
    pub chat: Arc<dyn ChatClient>,
    pub embeddings: Arc<dyn EmbeddingClient>,
    pub vector_db: Arc<dyn VectorDatabase>,
    pub http: Arc<dyn HttpExecutor>,
}

/// Builds the effector appropriate for a node metamodel's variant, wired to
/// the shared provider collaborators. This is the single place that maps a
/// `NodeMetamodel` tag to a concrete `Effector` implementation.
pub fn effector_for(metamodel: &NodeMetamodel, providers: &Providers) -> Box<dyn Effector> {
    match metamodel {
        NodeMetamodel::Llm { .. } => Box::new(LlmEffector::new(providers.chat.clone())),
        NodeMetamodel::Embeddings { .. } => Box::new(EmbeddingsEffector::new(providers.embeddings.clone())),
        NodeMetamodel::VectorDb { .. } => Box::new(VectorDbEffector::new(providers.vector_db.clone())),
        NodeMetamodel::Rest { .. } => Box::new(RestEffector::new(providers.http.clone())),
        NodeMetamodel::Gateway { .. } => Box::new(GatewayEffector::new()),
    }
}

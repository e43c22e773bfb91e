//! Composition root: wires concrete providers, the in-memory catalog and
//! retrieval, the intent detector/router/input mapper, and the orchestrator
//! behind the HTTP surface, then serves it.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenvy::dotenv;

use workflow_engine_api::api::orchestrate::OrchestrateState;
use workflow_engine_api::{
    Catalog, InMemoryCatalog, InMemoryRetrieval, InputMapper, IntentDetector, Orchestrator, Router,
};
use workflow_engine_core::config::EngineConfig;
use workflow_engine_core::node_instance::InstancesRegistry;
use workflow_engine_core::workflow_instance::WorkflowInstancesRegistry;
use workflow_engine_nodes::{AnthropicChatClient, InMemoryVectorDatabase, OpenAiEmbeddingClient, Providers, ReqwestExecutor};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = EngineConfig::from_env().map_err(|e| std::io::Error::other(e.to_string()))?;
    config.validate().map_err(|e| std::io::Error::other(e.to_string()))?;

    let providers = Providers {
        chat: Arc::new(AnthropicChatClient::new(
            config.providers.llm_api_key.clone(),
            config.providers.llm_default_model.clone(),
        )),
        embeddings: Arc::new(OpenAiEmbeddingClient::new(
            config.providers.embeddings_api_key.clone(),
            config.providers.embeddings_default_model.clone(),
        )),
        vector_db: Arc::new(InMemoryVectorDatabase::new()),
        http: Arc::new(ReqwestExecutor::new()),
    };

    let retrieval = Arc::new(InMemoryRetrieval::new());
    let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new(retrieval));
    let instances = Arc::new(InstancesRegistry::new());
    let workflow_instances = Arc::new(WorkflowInstancesRegistry::new());

    let detector = IntentDetector::new(
        providers.chat.clone(),
        providers.embeddings.clone(),
        catalog.clone(),
        config.providers.intent_confidence_threshold,
    );
    let router = Router::new(catalog.clone());
    let mapper = InputMapper::new(providers.chat.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        catalog,
        instances,
        workflow_instances,
        providers,
        detector,
        router,
        mapper,
    ));

    let state = web::Data::new(OrchestrateState {
        orchestrator,
        routing_temperature: config.providers.routing_temperature,
    });

    let bind_addr = (config.http.host.clone(), config.http.port);
    tracing::info!(host = %config.http.host, port = config.http.port, "starting server");

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(workflow_engine_api::api::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}

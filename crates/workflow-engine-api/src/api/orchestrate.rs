//! `POST /orchestrate` — the engine's single external entry point (spec
//! §6): detect intent, route, map inputs, execute the DAG, reflect, and
//! return the exit-node outputs plus an optional observability report.

use actix_web::{web, HttpResponse, Result as ActixResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use workflow_engine_core::error::WorkflowError;

use crate::orchestrator::{new_observation_id, Orchestrator, OrchestrationRequest};

/// Request body: `{request: string, observability: bool}` (spec §6).
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct OrchestrateRequestBody {
    pub request: String,
    #[serde(default)]
    pub observability: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrchestrateResponseBody {
    pub workflow_id: String,
    pub intent_id: String,
    #[schema(value_type = Object)]
    pub output: serde_json::Map<String, Value>,
    /// Present only when the request set `observability: true`.
    #[schema(value_type = Option<Object>)]
    pub report: Option<workflow_engine_core::executor::WorkflowObservabilityReport>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub observation_id: Option<String>,
}

pub struct OrchestrateState {
    pub orchestrator: std::sync::Arc<Orchestrator>,
    /// Sampling temperature for the router; not part of the request body,
    /// it's a deployment-wide setting (`ROUTING_TEMPERATURE`).
    pub routing_temperature: f64,
}

#[utoipa::path(
    post,
    path = "/orchestrate",
    tag = "Orchestration",
    request_body = OrchestrateRequestBody,
    responses(
        (status = 200, description = "Workflow executed", body = OrchestrateResponseBody),
        (status = 422, description = "No intent or workflow could be resolved", body = ApiErrorBody),
        (status = 500, description = "Execution failed", body = ApiErrorBody),
    )
)]
pub async fn orchestrate(
    state: web::Data<OrchestrateState>,
    body: web::Json<OrchestrateRequestBody>,
) -> ActixResult<HttpResponse> {
    let body = body.into_inner();
    let mut rng = StdRng::from_entropy();

    let request = OrchestrationRequest {
        request_text: body.request,
        temperature: state.routing_temperature,
    };

    match state.orchestrator.orchestrate(request, &mut rng).await {
        Ok(outcome) => {
            let report = if body.observability { Some(outcome.report) } else { None };
            Ok(HttpResponse::Ok().json(OrchestrateResponseBody {
                workflow_id: outcome.workflow_id,
                intent_id: outcome.intent_id,
                output: outcome.exit_values,
                report,
            }))
        }
        Err(error) => {
            tracing::warn!(error = %error, "orchestration failed");
            let status = status_for(&error);
            let envelope = error.into_envelope(Some(new_observation_id()));
            Ok(HttpResponse::build(status).json(ApiErrorBody {
                code: envelope.code,
                message: envelope.message,
                observation_id: envelope.observation_id,
            }))
        }
    }
}

fn status_for(error: &WorkflowError) -> actix_web::http::StatusCode {
    use actix_web::http::StatusCode;
    match error {
        WorkflowError::NoIntent
        | WorkflowError::InsufficientInputs { .. }
        | WorkflowError::NoWorkflowForIntent { .. }
        | WorkflowError::InvalidTemperature { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Catalog { .. } | WorkflowError::NodeNotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/orchestrate").route(web::post().to(orchestrate)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use std::sync::Arc;
    use workflow_engine_core::node_instance::InstancesRegistry;
    use workflow_engine_core::workflow_instance::WorkflowInstancesRegistry;
    use workflow_engine_nodes::providers::{
        ChatCompletion, MockChatClient, MockEmbeddingClient, MockHttpExecutor, MockVectorDatabase,
    };
    use workflow_engine_nodes::Providers;

    use crate::catalog::MockCatalog;
    use crate::input_mapper::InputMapper;
    use crate::intent::{IntentDetector, Router};

    fn state_with_no_intent() -> web::Data<OrchestrateState> {
        let mut embeddings = MockEmbeddingClient::new();
        embeddings.expect_embed().returning(|_| Box::pin(async { Ok(vec![0.1, 0.2]) }));
        let mut catalog = MockCatalog::new();
        catalog.expect_search_intents().returning(|_, _| Ok(vec![]));

        let mut chat = MockChatClient::new();
        chat.expect_complete().returning(|_, _, _, _| {
            Box::pin(async {
                Ok(ChatCompletion::text_only(
                    serde_json::json!({
                        "selectedIntentId": null,
                        "newIntentName": null,
                        "newIntentDescription": null,
                        "confidence": 0.0,
                        "userVariables": {}
                    })
                    .to_string(),
                ))
            })
        });

        let catalog: Arc<dyn crate::catalog::Catalog> = Arc::new(catalog);
        let providers = Providers {
            chat: Arc::new(chat),
            embeddings: Arc::new(embeddings),
            vector_db: Arc::new(MockVectorDatabase::new()),
            http: Arc::new(MockHttpExecutor::new()),
        };
        let detector = IntentDetector::new(providers.chat.clone(), providers.embeddings.clone(), catalog.clone(), 0.4);
        let router = Router::new(catalog.clone());
        let mapper = InputMapper::new(providers.chat.clone());

        let orchestrator = Orchestrator::new(
            catalog,
            Arc::new(InstancesRegistry::new()),
            Arc::new(WorkflowInstancesRegistry::new()),
            providers,
            detector,
            router,
            mapper,
        );

        web::Data::new(OrchestrateState { orchestrator: Arc::new(orchestrator), routing_temperature: 1.0 })
    }

    #[actix_web::test]
    async fn orchestrate_returns_unprocessable_entity_when_no_intent_matches() {
        let state = state_with_no_intent();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/orchestrate")
            .set_json(serde_json::json!({"request": "do something ambiguous"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNPROCESSABLE_ENTITY);

        let body: ApiErrorBody = test::read_body_json(resp).await;
        assert_eq!(body.code, "NO_INTENT");
    }
}

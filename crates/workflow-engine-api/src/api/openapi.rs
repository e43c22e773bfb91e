use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::health::HealthStatus;
use crate::api::orchestrate::{ApiErrorBody, OrchestrateRequestBody, OrchestrateResponseBody};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health_check,
        crate::api::orchestrate::orchestrate,
    ),
    components(schemas(HealthStatus, OrchestrateRequestBody, OrchestrateResponseBody, ApiErrorBody)),
    tags(
        (name = "Health", description = "Liveness probe"),
        (name = "Orchestration", description = "Intent detection, routing, and workflow execution"),
    ),
    info(
        title = "Workflow Orchestration Engine",
        description = "Reflective, DAG-based orchestration of heterogeneous AI workflows",
    )
)]
pub struct ApiDoc;

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()));
}

//! # HTTP Surface
//!
//! The orchestrator's only external boundary: `POST /orchestrate` and the
//! health/OpenAPI endpoints a caller needs to operate it. Errors crossing
//! this boundary are always the structured envelope from spec §7
//! (`WorkflowError::into_envelope`), never a raw error string.

pub mod health;
pub mod openapi;
pub mod orchestrate;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure);
    cfg.configure(orchestrate::configure);
    cfg.configure(openapi::configure);
}

//! # workflow-engine-api
//!
//! The orchestration surface: catalog storage, semantic retrieval, intent
//! detection and routing, port adaptation, input mapping, the end-to-end
//! [`orchestrator::Orchestrator`], and the HTTP entry point that exposes it.

pub mod api;
pub mod catalog;
pub mod input_mapper;
pub mod intent;
pub mod orchestrator;
pub mod port_adapter;
pub mod retrieval;

pub use catalog::{Catalog, InMemoryCatalog};
pub use input_mapper::InputMapper;
pub use intent::{DetectedIntent, IntentDetector, Router};
pub use orchestrator::{new_observation_id, Orchestrator, OrchestrationRequest, OrchestrationResponse};
pub use port_adapter::PortAdapter;
pub use retrieval::{InMemoryRetrieval, RankedMatch, Retrieval};

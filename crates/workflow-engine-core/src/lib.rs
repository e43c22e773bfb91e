//! # Workflow Engine Core
//!
//! Core primitives for the reflective, catalog-driven workflow orchestration engine:
//!
//! - [`schema`] / [`port`] — the recursive `PortSchema` structural type system and the
//!   `Port`s that carry it.
//! - [`context`] — `ExecutionContext`, the dotted-path-addressable store threaded through
//!   a run.
//! - [`metamodel`] — `NodeMetamodel`, `WorkflowMetamodel`, and `IntentMetamodel`: the
//!   catalog's declarative descriptions of nodes, DAGs, and intents.
//! - [`node_instance`] — `NodeInstance`/`Effector`: the runtime dispatch seam effector
//!   crates implement against, plus the process-wide `InstancesRegistry`.
//! - [`workflow_instance`] — `WorkflowInstance`: a `WorkflowMetamodel` resolved against
//!   a live `InstancesRegistry`, plus its own registry.
//! - [`executor`] — `WorkflowExecutor`: runs a `WorkflowInstance` to completion.
//! - [`error`] / [`config`] — the error taxonomy and environment-driven configuration.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod metamodel;
pub mod node_instance;
pub mod port;
pub mod schema;
pub mod workflow_instance;

pub use context::ExecutionContext;
pub use error::{ErrorEnvelope, Result, WorkflowError};
pub use executor::{
    ContextDiff, ContextKeyChange, NodeState, PortAdapterHook, TokenUsage, WorkflowExecutor,
    WorkflowObservabilityReport, TOKEN_USAGE_OUTPUT_KEY,
};
pub use metamodel::{
    EdgeCondition, Expression, HandledIntent, IntentMetamodel, NodeMetamodel, NodeMetamodelHeader, Operation,
    Version, WorkflowEdge, WorkflowMetamodel, WorkflowNode,
};
pub use node_instance::{Effector, InstancesRegistry, NodeInputs, NodeInstance, NodeOutputs};
pub use port::{Port, PortRole, PortSet};
pub use schema::{PortSchema, PortSchemaBuilder};
pub use workflow_instance::{WorkflowInstance, WorkflowInstancesRegistry};

/// Current version of the workflow engine core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for crates that implement effectors or drive the
/// executor.
pub mod prelude {
    pub use crate::context::ExecutionContext;
    pub use crate::error::{Result, WorkflowError};
    pub use crate::metamodel::{NodeMetamodel, WorkflowMetamodel};
    pub use crate::node_instance::{Effector, NodeInputs, NodeInstance, NodeOutputs};
    pub use crate::port::{Port, PortRole};
    pub use crate::schema::{PortSchema, PortSchemaBuilder};
    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;
}

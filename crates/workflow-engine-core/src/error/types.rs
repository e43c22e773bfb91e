//! # Error Taxonomy
//!
//! `WorkflowError` is the single error type surfaced by the port/schema model, the
//! execution context, node instances, and the workflow executor. Every variant maps
//! to one of the error codes in the orchestration spec so that callers (the
//! orchestrator, the HTTP surface) can translate a failure into the structured
//! `{code, message, observationId}` envelope without string-matching error text.

use std::any::TypeId;

/// Primary error type for the port/schema model and the workflow executor.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A `PortSchema` builder invariant was violated (e.g. a default value that
    /// does not validate against the schema being built).
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// `getSchemaByPath` walked off the declared port tree.
    #[error("unknown path segment '{segment}' in path '{path}'")]
    UnknownPathSegment { path: String, segment: String },

    /// A node metamodel references a port key that does not exist.
    #[error("unknown port '{key}' on node '{node_id}'")]
    UnknownPort { node_id: String, key: String },

    /// A metamodel version bump did not satisfy the semver rules in the spec.
    #[error("invalid version bump from {from} to {to}")]
    InvalidVersionBump { from: String, to: String },

    /// Workflow edges induce a cycle.
    #[error("workflow contains a cycle")]
    WorkflowCycle,

    /// An edge references a node or port path that does not resolve.
    #[error("dangling edge {edge_id}: {reason}")]
    DanglingEdge { edge_id: String, reason: String },

    /// General catalog/metamodel validation failure.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A node reached READY but one or more required inputs are still null
    /// after the port adapter ran.
    #[error("unsatisfied required inputs on node '{node_id}': {missing:?}")]
    UnsatisfiedInputs {
        node_id: String,
        missing: Vec<String>,
    },

    /// The port adapter could not produce a validated binding after its retry.
    #[error("adaptation failed for node '{node_id}': {reason}")]
    AdaptationFailed { node_id: String, reason: String },

    /// An LLM node's response did not parse into the requested output schema
    /// after one retry with a critique message.
    #[error("LLM structured output parse failure: {message}")]
    LlmStructuredOutputParse { message: String },

    /// An effector's I/O exceeded its per-kind timeout.
    #[error("effector timeout after {millis}ms")]
    EffectorTimeout { millis: u64 },

    /// A transient effector failure (5xx, rate limit) that retries did not
    /// resolve within the attempt budget.
    #[error("transient effector error: {message}")]
    EffectorTransient { message: String },

    /// A permanent (non-retryable) effector failure.
    #[error("permanent effector error: {message}")]
    EffectorPermanent { message: String },

    /// The node referenced by a workflow node is not registered in the
    /// instances registry.
    #[error("node instance not found: {node_id}")]
    NodeNotFound { node_id: String },

    /// Attempted to double-register an id, or register a null id/instance,
    /// in one of the process-wide registries.
    #[error("registry error: {message}")]
    RegistryError { message: String },

    /// No intent cleared the confidence threshold.
    #[error("no intent detected")]
    NoIntent,

    /// The input mapper could not populate every required entry-node input.
    #[error("insufficient inputs: {missing:?}")]
    InsufficientInputs { missing: Vec<String> },

    /// No enabled workflow declares the detected intent as handled.
    #[error("no workflow registered for intent '{intent_id}'")]
    NoWorkflowForIntent { intent_id: String },

    /// Temperature-softmax sampling was asked for a negative temperature.
    #[error("invalid sampling temperature: {temperature}")]
    InvalidTemperature { temperature: f64 },

    /// Failed to serialize a value to JSON.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Failed to deserialize JSON into an expected shape.
    #[error("deserialization error: {message}")]
    Deserialization { message: String },

    /// Surfaced by the (out-of-scope) catalog/storage collaborator.
    #[error("catalog error: {message}")]
    Catalog { message: String },

    /// Surfaced by the (out-of-scope) HTTP transport collaborator.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Legacy-shaped variant retained for `TypeId`-keyed lookups used by
    /// in-process test doubles; the catalog-driven registries use
    /// `NodeNotFound`/`RegistryError` instead.
    #[error("type not registered: {type_id:?}")]
    TypeNotRegistered { type_id: TypeId },
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

impl From<serde_json::Error> for WorkflowError {
    fn from(error: serde_json::Error) -> Self {
        WorkflowError::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            WorkflowError::EffectorTimeout { millis: 0 }
        } else if error.status().map(|s| s.is_server_error()).unwrap_or(false) {
            WorkflowError::EffectorTransient {
                message: error.to_string(),
            }
        } else {
            WorkflowError::EffectorPermanent {
                message: error.to_string(),
            }
        }
    }
}

/// Structured error envelope returned across the orchestrator boundary, per
/// the spec's §7 propagation rule: "the orchestrator emits a structured error
/// `{code, message, observationId}`".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub observation_id: Option<String>,
}

impl WorkflowError {
    /// Stable error code for the `ErrorEnvelope.code` field, matching the
    /// taxonomy names in spec §7.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidSchema { .. } => "VALIDATION",
            WorkflowError::UnknownPathSegment { .. } => "VALIDATION",
            WorkflowError::UnknownPort { .. } => "VALIDATION",
            WorkflowError::InvalidVersionBump { .. } => "VALIDATION",
            WorkflowError::WorkflowCycle => "WORKFLOW_CYCLE",
            WorkflowError::DanglingEdge { .. } => "DANGLING_EDGE",
            WorkflowError::Validation { .. } => "VALIDATION",
            WorkflowError::UnsatisfiedInputs { .. } => "UNSATISFIED_INPUTS",
            WorkflowError::AdaptationFailed { .. } => "ADAPTATION_FAILED",
            WorkflowError::LlmStructuredOutputParse { .. } => "LLM_STRUCTURED_OUTPUT_PARSE",
            WorkflowError::EffectorTimeout { .. } => "EFFECTOR_TIMEOUT",
            WorkflowError::EffectorTransient { .. } => "EFFECTOR_TRANSIENT",
            WorkflowError::EffectorPermanent { .. } => "EFFECTOR_PERMANENT",
            WorkflowError::NodeNotFound { .. } => "EFFECTOR_PERMANENT",
            WorkflowError::RegistryError { .. } => "VALIDATION",
            WorkflowError::NoIntent => "NO_INTENT",
            WorkflowError::InsufficientInputs { .. } => "INSUFFICIENT_INPUTS",
            WorkflowError::NoWorkflowForIntent { .. } => "NO_WORKFLOW_FOR_INTENT",
            WorkflowError::InvalidTemperature { .. } => "VALIDATION",
            WorkflowError::Serialization { .. } => "VALIDATION",
            WorkflowError::Deserialization { .. } => "VALIDATION",
            WorkflowError::Catalog { .. } => "EFFECTOR_PERMANENT",
            WorkflowError::Transport { .. } => "EFFECTOR_TRANSIENT",
            WorkflowError::TypeNotRegistered { .. } => "VALIDATION",
        }
    }

    pub fn into_envelope(self, observation_id: Option<String>) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.code().to_string(),
            message: self.to_string(),
            observation_id,
        }
    }
}

//! # Ports
//!
//! A [`Port`] is a named, typed I/O endpoint on a node. Per the redesign notes, a port
//! is a tagged sum over the node kinds that can own it — `Standard` (gateway pass-through),
//! `Llm`, `Embeddings`, `VectorDb`, `Rest` — each carrying a role enum specific to that
//! effector plus the shared `{key, schema, default_value}` fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::PortSchema;

/// Role a port plays within an LLM node's prompt construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmPortRole {
    UserPrompt,
    SystemPromptVariable,
    Response,
}

/// Role a port plays within a vector-db node's ANN query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorDbPortRole {
    InputVector,
    Results,
    FirstResult,
}

/// Role a port plays within an embeddings node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingsPortRole {
    InputText,
    OutputVector,
}

/// Role a port plays within a REST node's request/response assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestPortRole {
    RequestBodyField,
    RequestHeader,
    RequestPathVariable,
    RequestQueryVariable,
    ResponseBodyField,
    ResponseStatus,
}

/// Per-node-kind role tag. A gateway node's ports are plain pass-through and
/// carry no distinguishing role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "role", rename_all = "snake_case")]
pub enum PortRole {
    Standard,
    Llm(LlmPortRole),
    VectorDb(VectorDbPortRole),
    Embeddings(EmbeddingsPortRole),
    Rest(RestPortRole),
}

/// A named, typed endpoint on a node. `key` is unique within its port-set
/// (input or output) on the owning node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub key: String,
    pub schema: PortSchema,
    pub role: PortRole,
    pub default_value: Option<Value>,
}

impl Port {
    pub fn new(key: impl Into<String>, schema: PortSchema, role: PortRole) -> Self {
        Self {
            key: key.into(),
            schema,
            role,
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn is_required(&self) -> bool {
        self.schema.required()
    }
}

/// A node's full set of input or output ports, addressable by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSet(pub Vec<Port>);

impl PortSet {
    pub fn get(&self, key: &str) -> Option<&Port> {
        self.0.iter().find(|p| p.key == key)
    }

    pub fn required_keys(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.key.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.0.iter()
    }
}

//! # Port Schemas
//!
//! [`PortSchema`] is the recursive structural type carried by every [`crate::port::Port`].
//! It supports the three operations the adapter, executor, and catalog all lean on:
//! [`PortSchema::is_compatible`] (can a source port feed a target port), [`PortSchema::is_valid_value`]
//! (does a concrete JSON value satisfy this schema), and [`PortSchema::schema_by_path`] (resolve a
//! dotted path to the sub-schema it addresses).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WorkflowError};

/// A structural type for port values. `OBJECT` and `ARRAY` nest recursively;
/// every variant carries `required` (whether `null`/absent is acceptable) and
/// an optional `default_value` applied when a binding is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum PortSchema {
    String {
        required: bool,
        default_value: Option<Value>,
    },
    Int {
        required: bool,
        default_value: Option<Value>,
    },
    Float {
        required: bool,
        default_value: Option<Value>,
    },
    Boolean {
        required: bool,
        default_value: Option<Value>,
    },
    Date {
        required: bool,
        default_value: Option<Value>,
    },
    Array {
        items: Box<PortSchema>,
        required: bool,
        default_value: Option<Value>,
    },
    Object {
        /// Declared properties, keyed by name. An empty map denotes an "open"
        /// object that accepts any `OBJECT` value (used for opaque payloads
        /// like raw REST response bodies).
        properties: BTreeMap<String, PortSchema>,
        required: bool,
        default_value: Option<Value>,
    },
}

impl PortSchema {
    pub fn required(&self) -> bool {
        match self {
            PortSchema::String { required, .. }
            | PortSchema::Int { required, .. }
            | PortSchema::Float { required, .. }
            | PortSchema::Boolean { required, .. }
            | PortSchema::Date { required, .. }
            | PortSchema::Array { required, .. }
            | PortSchema::Object { required, .. } => *required,
        }
    }

    pub fn default_value(&self) -> Option<&Value> {
        match self {
            PortSchema::String { default_value, .. }
            | PortSchema::Int { default_value, .. }
            | PortSchema::Float { default_value, .. }
            | PortSchema::Boolean { default_value, .. }
            | PortSchema::Date { default_value, .. }
            | PortSchema::Array { default_value, .. }
            | PortSchema::Object { default_value, .. } => default_value.as_ref(),
        }
    }

    /// True if a value conforming to `self` is always acceptable wherever
    /// `target` is expected. Compatibility is a partial order, not generally
    /// symmetric — except for the `INT`/`FLOAT` widening case, which the spec
    /// calls out as symmetric by design (either may feed the other).
    pub fn is_compatible(&self, target: &PortSchema) -> bool {
        use PortSchema::*;
        match (self, target) {
            (String { .. }, String { .. }) => true,
            (Boolean { .. }, Boolean { .. }) => true,
            (Date { .. }, Date { .. }) => true,
            (Int { .. }, Int { .. }) => true,
            (Float { .. }, Float { .. }) => true,
            (Int { .. }, Float { .. }) => true,
            (Float { .. }, Int { .. }) => true,
            (Array { items: src_items, .. }, Array { items: tgt_items, .. }) => {
                src_items.is_compatible(tgt_items)
            }
            (Object { properties: src_props, .. }, Object { properties: tgt_props, .. }) => {
                if tgt_props.is_empty() {
                    return true;
                }
                tgt_props.iter().all(|(key, tgt_schema)| {
                    src_props
                        .get(key)
                        .map(|src_schema| src_schema.is_compatible(tgt_schema))
                        .unwrap_or(false)
                })
            }
            _ => false,
        }
    }

    /// Total, never-failing validity check: does `value` satisfy `self`.
    /// `null`/absent is valid only when the schema is not `required`.
    pub fn is_valid_value(&self, value: &Value) -> bool {
        if value.is_null() {
            return !self.required();
        }
        match self {
            PortSchema::String { .. } => value.is_string(),
            PortSchema::Int { .. } => value.is_i64() || value.is_u64(),
            PortSchema::Float { .. } => value.is_f64() || value.is_i64() || value.is_u64(),
            PortSchema::Boolean { .. } => value.is_boolean(),
            PortSchema::Date { .. } => value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            PortSchema::Array { items, .. } => match value.as_array() {
                Some(arr) => arr.iter().all(|elem| items.is_valid_value(elem)),
                None => false,
            },
            PortSchema::Object { properties, .. } => {
                let obj = match value.as_object() {
                    Some(obj) => obj,
                    None => return false,
                };
                if obj.keys().any(|k| !properties.contains_key(k)) {
                    return false;
                }
                properties.iter().all(|(key, sub_schema)| {
                    let sub_value = obj.get(key).cloned().unwrap_or(Value::Null);
                    sub_schema.is_valid_value(&sub_value)
                })
            }
        }
    }

    /// Resolves a dotted path against this schema's structure: `""` returns
    /// `self`; each segment descends one `OBJECT` property, or — when the
    /// current schema is an `ARRAY` and the segment parses as an integer —
    /// descends into the (index-independent) item schema. A trailing `.`
    /// produces a final empty segment which is tolerated as a no-op. Any
    /// other unresolvable segment is an error.
    pub fn schema_by_path(&self, path: &str) -> Result<&PortSchema> {
        if path.is_empty() {
            return Ok(self);
        }
        let mut current = self;
        for (i, segment) in path.split('.').enumerate() {
            let is_trailing_empty = segment.is_empty() && i == path.split('.').count() - 1;
            if is_trailing_empty {
                continue;
            }
            current = current.descend(segment).ok_or_else(|| WorkflowError::UnknownPathSegment {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
        }
        Ok(current)
    }

    fn descend(&self, segment: &str) -> Option<&PortSchema> {
        match self {
            PortSchema::Object { properties, .. } => properties.get(segment),
            PortSchema::Array { items, .. } => segment.parse::<usize>().ok().map(|_| items.as_ref()),
            _ => None,
        }
    }
}

/// Fluent builder for [`PortSchema`] that validates `default_value` against
/// the schema being built before it is constructed, returning
/// `WorkflowError::InvalidSchema` rather than producing an inconsistent
/// schema.
pub struct PortSchemaBuilder {
    kind: SchemaKind,
    required: bool,
    default_value: Option<Value>,
}

enum SchemaKind {
    String,
    Int,
    Float,
    Boolean,
    Date,
    Array(Box<PortSchema>),
    Object(BTreeMap<String, PortSchema>),
}

impl PortSchemaBuilder {
    fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            required: true,
            default_value: None,
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String)
    }

    pub fn int() -> Self {
        Self::new(SchemaKind::Int)
    }

    pub fn float() -> Self {
        Self::new(SchemaKind::Float)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaKind::Boolean)
    }

    pub fn date() -> Self {
        Self::new(SchemaKind::Date)
    }

    pub fn array(items: PortSchema) -> Self {
        Self::new(SchemaKind::Array(Box::new(items)))
    }

    pub fn object(properties: BTreeMap<String, PortSchema>) -> Self {
        Self::new(SchemaKind::Object(properties))
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn build(self) -> Result<PortSchema> {
        let schema = match self.kind {
            SchemaKind::String => PortSchema::String {
                required: self.required,
                default_value: self.default_value.clone(),
            },
            SchemaKind::Int => PortSchema::Int {
                required: self.required,
                default_value: self.default_value.clone(),
            },
            SchemaKind::Float => PortSchema::Float {
                required: self.required,
                default_value: self.default_value.clone(),
            },
            SchemaKind::Boolean => PortSchema::Boolean {
                required: self.required,
                default_value: self.default_value.clone(),
            },
            SchemaKind::Date => PortSchema::Date {
                required: self.required,
                default_value: self.default_value.clone(),
            },
            SchemaKind::Array(items) => PortSchema::Array {
                items,
                required: self.required,
                default_value: self.default_value.clone(),
            },
            SchemaKind::Object(properties) => PortSchema::Object {
                properties,
                required: self.required,
                default_value: self.default_value.clone(),
            },
        };
        if let Some(default) = schema.default_value() {
            if !schema.is_valid_value(default) {
                return Err(WorkflowError::InvalidSchema {
                    message: format!("default value {default} does not satisfy schema {schema:?}"),
                });
            }
        }
        Ok(schema)
    }
}

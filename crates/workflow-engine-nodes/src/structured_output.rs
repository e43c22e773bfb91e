//! # Structured LLM Output
//!
//! Helper shared by every LLM-backed collaborator (the LLM effector itself, the port
//! adapter, the intent detector, and the input mapper) that needs a model's response
//! coerced into a specific [`PortSchema`] shape: append a JSON-shape instruction to the
//! prompt, extract the first JSON value from the raw completion, validate it against the
//! schema, and — on failure — retry exactly once with a critique message describing what
//! was wrong.

use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::executor::TokenUsage;
use workflow_engine_core::schema::PortSchema;
use serde_json::Value;

use crate::providers::ChatClient;

/// Renders a human-readable description of the JSON shape a completion must
/// produce, e.g. `{"name": STRING, "age": INT}` for an `OBJECT` schema.
pub fn describe_shape(schema: &PortSchema) -> String {
    match schema {
        PortSchema::String { .. } => "STRING".to_string(),
        PortSchema::Int { .. } => "INTEGER".to_string(),
        PortSchema::Float { .. } => "NUMBER".to_string(),
        PortSchema::Boolean { .. } => "BOOLEAN (true or false)".to_string(),
        PortSchema::Date { .. } => "an RFC3339 timestamp STRING".to_string(),
        PortSchema::Array { items, .. } => format!("a JSON array of [{}]", describe_shape(items)),
        PortSchema::Object { properties, .. } => {
            let fields: Vec<String> = properties
                .iter()
                .map(|(key, sub)| format!("\"{key}\": {}", describe_shape(sub)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
    }
}

/// Scans `text` for the first syntactically balanced `{...}` or `[...]`
/// substring and attempts to parse it as JSON, tolerating prose the model
/// wrapped the JSON in (code fences, a leading "Here is the result:").
pub fn extract_first_json_value(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    for (start, &b) in bytes.iter().enumerate() {
        if b != b'{' && b != b'[' {
            continue;
        }
        let (open, close) = if b == b'{' { (b'{', b'}') } else { (b'[', b']') };
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &c) in bytes[start..].iter().enumerate() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == b'\\' {
                    escaped = true;
                } else if c == b'"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                b'"' => in_string = true,
                c if c == open => depth += 1,
                c if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        let end = start + offset + 1;
                        if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Requests a completion from `chat` shaped to satisfy `schema`, validating
/// the parsed result and retrying once with a critique message if parsing
/// or validation fails. Returns `LlmStructuredOutputParse` if the retry also
/// fails. Returns the token usage of whichever attempt produced the final
/// value alongside it.
pub async fn generate_structured_output(
    chat: &dyn ChatClient,
    system_prompt: &str,
    user_prompt: &str,
    schema: &PortSchema,
    temperature: f64,
    max_tokens: u32,
) -> Result<(Value, Option<TokenUsage>)> {
    let shape = describe_shape(schema);
    let shaped_system_prompt =
        format!("{system_prompt}\n\nRespond with a single JSON value matching this shape exactly: {shape}");

    let completion = chat.complete(&shaped_system_prompt, user_prompt, temperature, max_tokens).await?;
    if let Some(value) = extract_first_json_value(&completion.text) {
        if schema.is_valid_value(&value) {
            return Ok((value, completion.usage));
        }
    }

    let critique = format!(
        "Your previous response did not contain valid JSON matching the shape {shape}. \
         Respond again with only the corrected JSON value and no other text."
    );
    let retry = chat.complete(&shaped_system_prompt, &critique, temperature, max_tokens).await?;
    match extract_first_json_value(&retry.text) {
        Some(value) if schema.is_valid_value(&value) => Ok((value, retry.usage)),
        _ => Err(WorkflowError::LlmStructuredOutputParse {
            message: format!("no value matching shape {shape} after one retry"),
        }),
    }
}

//! # Intent Detection + Routing
//!
//! [`IntentDetector`] matches free-text requests to a catalog intent (spec
//! §4.G, part one): embed the request, retrieve the top-K semantically
//! similar intents, then ask an LLM to either confirm one of them or propose
//! a new one, gated by a confidence threshold. [`Router`] then picks a
//! workflow among those declaring the intent, via temperature-softmax
//! sampling over the catalog's score ranking (spec §4.G, part two).

use std::sync::Arc;

use chrono::Utc;
use rand::{Rng, RngCore};
use serde_json::Value;
use uuid::Uuid;

use workflow_engine_core::error::{Result, WorkflowError};
use workflow_engine_core::metamodel::IntentMetamodel;
use workflow_engine_nodes::structured_output::extract_first_json_value;
use workflow_engine_nodes::{ChatClient, EmbeddingClient};

use crate::catalog::Catalog;

const CANDIDATE_TOP_K: usize = 5;

/// The outcome of a successful intent-detection pass: the intent id
/// (existing or freshly minted) plus any variables the LLM extracted from
/// the request text for the input mapper to consume.
#[derive(Debug, Clone)]
pub struct DetectedIntent {
    pub intent_id: String,
    pub user_variables: serde_json::Map<String, Value>,
}

pub struct IntentDetector {
    chat: Arc<dyn ChatClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    catalog: Arc<dyn Catalog>,
    confidence_threshold: f64,
}

impl IntentDetector {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        embeddings: Arc<dyn EmbeddingClient>,
        catalog: Arc<dyn Catalog>,
        confidence_threshold: f64,
    ) -> Self {
        Self { chat, embeddings, catalog, confidence_threshold }
    }

    pub async fn detect(&self, request_text: &str) -> Result<DetectedIntent> {
        let embedding = self.embeddings.embed(request_text).await?;
        let candidates = self.catalog.search_intents(&embedding, CANDIDATE_TOP_K).await?;

        let system_prompt = self.build_prompt(&candidates);
        let user_prompt = format!("Request: {request_text}");

        let raw = self.chat.complete(&system_prompt, &user_prompt, 0.0, 512).await?.text;
        let parsed = match self.parse_response(&raw) {
            Ok(parsed) => parsed,
            Err(first_reason) => {
                let critique = format!(
                    "Your previous response was invalid: {first_reason}. \
                     Respond again with only the corrected JSON object."
                );
                let retry_raw = self.chat.complete(&system_prompt, &critique, 0.0, 512).await?.text;
                self.parse_response(&retry_raw).map_err(|reason| WorkflowError::LlmStructuredOutputParse {
                    message: reason,
                })?
            }
        };

        if parsed.confidence < self.confidence_threshold {
            return Err(WorkflowError::NoIntent);
        }

        if let Some(selected_id) = &parsed.selected_intent_id {
            if candidates.iter().any(|c| &c.id == selected_id) {
                return Ok(DetectedIntent {
                    intent_id: selected_id.clone(),
                    user_variables: parsed.user_variables,
                });
            }
        }

        if let Some(name) = &parsed.new_intent_name {
            if is_upper_snake_case(name) {
                let description = parsed.new_intent_description.clone().unwrap_or_default();
                let embedding = self.embeddings.embed(&description).await?;
                let intent = IntentMetamodel {
                    id: Uuid::new_v4().to_string(),
                    name: name.clone(),
                    description,
                    ai_generated: true,
                    embedding,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                let intent_id = intent.id.clone();
                self.catalog.create_intent(intent).await?;
                return Ok(DetectedIntent { intent_id, user_variables: parsed.user_variables });
            }
        }

        Err(WorkflowError::NoIntent)
    }

    fn build_prompt(&self, candidates: &[IntentMetamodel]) -> String {
        let listing: Vec<String> = candidates
            .iter()
            .map(|c| format!("  - id=\"{}\" name=\"{}\": {}", c.id, c.name, c.description))
            .collect();
        format!(
            "You are the intent detector for a workflow orchestration engine. \
             Given a user's request, decide which of these known intents it matches, \
             or propose a brand new one if none fit:\n{}\n\n\
             Respond with a single JSON object of this shape:\n\
             {{\"selectedIntentId\": \"<id or null>\", \"newIntentName\": \"<UPPER_SNAKE_CASE or null>\", \
             \"newIntentDescription\": \"<string or null>\", \"confidence\": <0.0-1.0>, \
             \"userVariables\": {{...free-form values extracted from the request...}}}}\n\
             Only one of selectedIntentId/newIntentName should be non-null.",
            listing.join("\n")
        )
    }

    fn parse_response(&self, raw: &str) -> std::result::Result<ParsedDetection, String> {
        let value = extract_first_json_value(raw).ok_or_else(|| "no JSON object found in response".to_string())?;
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| "missing numeric 'confidence'".to_string())?;
        let selected_intent_id = value.get("selectedIntentId").and_then(Value::as_str).map(str::to_string);
        let new_intent_name = value.get("newIntentName").and_then(Value::as_str).map(str::to_string);
        let new_intent_description = value.get("newIntentDescription").and_then(Value::as_str).map(str::to_string);
        let user_variables = value
            .get("userVariables")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(ParsedDetection {
            selected_intent_id,
            new_intent_name,
            new_intent_description,
            confidence,
            user_variables,
        })
    }
}

struct ParsedDetection {
    selected_intent_id: Option<String>,
    new_intent_name: Option<String>,
    new_intent_description: Option<String>,
    confidence: f64,
    user_variables: serde_json::Map<String, Value>,
}

fn is_upper_snake_case(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Selects a workflow among those declaring a detected intent, via
/// temperature-softmax sampling over the catalog's score-descending
/// ranking: probabilities proportional to `exp(-rank / T)`.
pub struct Router {
    catalog: Arc<dyn Catalog>,
}

impl Router {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    pub async fn route(&self, intent_id: &str, temperature: f64, rng: &mut dyn RngCore) -> Result<String> {
        if temperature < 0.0 {
            return Err(WorkflowError::InvalidTemperature { temperature });
        }

        let workflows = self.catalog.enabled_workflows_for_intent(intent_id).await?;
        if workflows.is_empty() {
            return Err(WorkflowError::NoWorkflowForIntent { intent_id: intent_id.to_string() });
        }

        if temperature == 0.0 {
            return Ok(workflows[0].id.clone());
        }

        let logits: Vec<f64> = (0..workflows.len()).map(|rank| -(rank as f64) / temperature).collect();
        let max_logit = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = logits.iter().map(|logit| (logit - max_logit).exp()).collect();
        let total: f64 = weights.iter().sum();

        let mut draw = rng.gen::<f64>() * total;
        for (workflow, weight) in workflows.iter().zip(weights.iter()) {
            if draw < *weight {
                return Ok(workflow.id.clone());
            }
            draw -= weight;
        }
        Ok(workflows.last().expect("checked non-empty above").id.clone())
    }
}

//! # Provider Seams
//!
//! The thin async traits effector implementations call through to reach an external
//! collaborator: a chat-completion API, an embeddings API, a vector database, or a
//! generic REST endpoint. Keeping these as traits (rather than calling `reqwest`
//! directly from the effectors) mirrors the teacher's `AgentRegistry`
//! (`registry/agent_registry.rs`) seam and lets tests substitute
//! `mockall`-generated fakes instead of making network calls.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use workflow_engine_core::error::Result;
use workflow_engine_core::executor::TokenUsage;
use workflow_engine_core::metamodel::HttpMethod;

/// One non-streaming completion: the provider's text plus its token
/// accounting, when the provider reports one.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl ChatCompletion {
    /// Convenience for call sites (and tests) that only care about the text.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self { text: text.into(), usage: None }
    }
}

/// A chat-completion provider (Anthropic, OpenAI, ...). One call is one
/// non-streaming completion.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<ChatCompletion>;
}

/// An embeddings provider.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchResult {
    pub id: String,
    pub score: f64,
    pub payload: Value,
}

/// An ANN vector store (the spec explicitly places a concrete Mongo driver
/// out of scope as an external collaborator; this trait is the seam a
/// concrete store plugs into).
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait VectorDatabase: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u32,
        similarity_threshold: f64,
    ) -> Result<Vec<VectorSearchResult>>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

/// A generic REST call executor.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<Value>,
    ) -> Result<HttpResponse>;
}

/// `reqwest`-backed [`HttpExecutor`] used outside of tests.
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<Value>,
    ) -> Result<HttpResponse> {
        let method = match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut request = self.client.request(method, url);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok(HttpResponse { status, body })
    }
}

/// `reqwest`-backed [`ChatClient`] calling the Anthropic Messages API
/// directly. Vendor SDKs are explicitly out of scope (spec §1) — this talks
/// the wire format with plain `reqwest`, the same way [`ReqwestExecutor`]
/// does for REST nodes.
pub struct AnthropicChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicChatClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, model }
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<ChatCompletion> {
        let body = serde_json::json!({
            "model": self.model,
            "system": system_prompt,
            "messages": [{"role": "user", "content": user_prompt}],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?
            .json::<Value>()
            .await?;

        let text = response
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| workflow_engine_core::error::WorkflowError::Deserialization {
                message: "Anthropic response missing content[0].text".to_string(),
            })?;

        let usage = response.get("usage").and_then(|usage| {
            let prompt_tokens = usage.get("input_tokens")?.as_u64()? as u32;
            let completion_tokens = usage.get("output_tokens")?.as_u64()? as u32;
            Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            })
        });

        Ok(ChatCompletion { text, usage })
    }
}

/// `reqwest`-backed [`EmbeddingClient`] calling the OpenAI embeddings API.
pub struct OpenAiEmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, model }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({ "model": self.model, "input": text });
        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .json::<Value>()
            .await?;

        response
            .get("data")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("embedding"))
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_f64).map(|v| v as f32).collect())
            .ok_or_else(|| workflow_engine_core::error::WorkflowError::Deserialization {
                message: "OpenAI response missing data[0].embedding".to_string(),
            })
    }
}

/// In-process [`VectorDatabase`] reference implementation, cosine-ranked.
/// A concrete Mongo (or other ANN store) driver is an external collaborator
/// out of scope for this engine (spec §1); this is the in-memory stand-in a
/// composition root can reach for when no such store is wired up.
#[derive(Default)]
pub struct InMemoryVectorDatabase {
    collections: std::sync::RwLock<BTreeMap<String, Vec<(String, Vec<f32>, Value)>>>,
}

impl InMemoryVectorDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, id: impl Into<String>, vector: Vec<f32>, payload: Value) {
        self.collections
            .write()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push((id.into(), vector, payload));
    }

    fn cosine(a: &[f32], b: &[f32]) -> f64 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            (dot / (norm_a * norm_b)) as f64
        }
    }
}

#[async_trait]
impl VectorDatabase for InMemoryVectorDatabase {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u32,
        similarity_threshold: f64,
    ) -> Result<Vec<VectorSearchResult>> {
        let collections = self.collections.read().unwrap();
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<VectorSearchResult> = entries
            .iter()
            .map(|(id, entry_vector, payload)| VectorSearchResult {
                id: id.clone(),
                score: Self::cosine(vector, entry_vector),
                payload: payload.clone(),
            })
            .filter(|result| result.score >= similarity_threshold)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit as usize);
        Ok(scored)
    }
}

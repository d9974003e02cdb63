//! OpenAI-compatible HTTP provider adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::request::{ChatMessage, Role};
use crate::response::{FinishReason, Usage};

use super::{AdapterResult, CallOptions, ProviderAdapter};

pub struct HttpProviderAdapter {
    tag: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpProviderAdapter {
    pub fn new(tag: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            tag: tag.into(),
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url.trim_end_matches('/'))
    }

    fn classify_status(&self, status: reqwest::StatusCode, body: String) -> GatewayError {
        match status.as_u16() {
            401 | 403 => GatewayError::Unauthorized,
            429 => GatewayError::RateLimited { retry_after_ms: None },
            400 | 404 | 422 => GatewayError::Permanent(body),
            500..=599 => GatewayError::Transient(body),
            _ => GatewayError::Permanent(body),
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelDatum>,
}

#[derive(Deserialize)]
struct ModelDatum {
    id: String,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn finish_reason_from_wire(s: Option<&str>) -> FinishReason {
    match s {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(_) => FinishReason::Stop,
        None => FinishReason::Stop,
    }
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn generate_chat(
        &self,
        messages: &[ChatMessage],
        opts: &CallOptions,
    ) -> Result<AdapterResult, GatewayError> {
        let wire_messages = messages
            .iter()
            .map(|m| WireMessage {
                role: role_str(m.role),
                content: &m.content,
            })
            .collect();

        let body = ChatCompletionRequest {
            model: &opts.model,
            messages: wire_messages,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
        };

        let mut req = self.client.post(self.chat_url()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(self.classify_status(status, text));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Internal(format!("bad chat response body: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Internal("provider returned no choices".into()))?;

        let usage = parsed.usage.unwrap_or_default();

        Ok(AdapterResult {
            content: choice.message.content,
            finish_reason: finish_reason_from_wire(choice.finish_reason.as_deref()),
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let body = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: text,
        };
        let mut req = self.client.post(self.embeddings_url()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(self.classify_status(status, text));
        }
        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Internal(format!("bad embedding response body: {e}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GatewayError::Internal("provider returned no embedding".into()))
    }

    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        let mut req = self.client.get(self.models_url());
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(self.classify_status(status, text));
        }
        let parsed: ModelsResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Internal(format!("bad models response body: {e}")))?;
        Ok(parsed.data.into_iter().map(|d| d.id).collect())
    }
}

//! Provider adapter abstraction: a uniform interface over upstream AI
//! vendors (chat, streaming chat, embeddings, model listing).
//!
//! Implementations: [`MockProviderAdapter`] (deterministic, no network
//! calls — used by tests and as the default when no API key is configured)
//! and [`HttpProviderAdapter`] (OpenAI-compatible `/chat/completions` wire
//! format over `reqwest`).

mod http;
mod mock;

pub use http::HttpProviderAdapter;
pub use mock::MockProviderAdapter;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::request::ChatMessage;
use crate::response::{FinishReason, Usage};

/// One incremental chunk of a streamed response.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub content: String,
    pub finish_reason: Option<FinishReason>,
}

/// Outcome of a single provider call, before the gateway wraps it into a
/// full [`crate::response::Response`] (which additionally carries request
/// id, cache-hit flag, and timing).
#[derive(Debug, Clone)]
pub struct AdapterResult {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Options that modulate a single adapter call; kept separate from
/// [`ChatMessage`] so adapters can add knobs without touching the request
/// wire schema.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Uniform interface every upstream vendor is adapted to. Adapters must be
/// `Send + Sync` since many workers share one `Arc<dyn ProviderAdapter>`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Adapter-local name, e.g. `"primary"` / `"secondary"`; used as the
    /// circuit-breaker and connection-pool key.
    fn tag(&self) -> &str;

    async fn generate_chat(
        &self,
        messages: &[ChatMessage],
        opts: &CallOptions,
    ) -> Result<AdapterResult, GatewayError>;

    /// Streams a chat completion, sending chunks through `on_chunk` in
    /// arrival order. Returns the fully assembled result once the stream
    /// ends.
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        opts: &CallOptions,
        on_chunk: mpsc::Sender<StreamChunk>,
    ) -> Result<AdapterResult, GatewayError> {
        let result = self.generate_chat(messages, opts).await?;
        let _ = on_chunk
            .send(StreamChunk {
                content: result.content.clone(),
                finish_reason: Some(result.finish_reason),
            })
            .await;
        Ok(result)
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    async fn list_models(&self) -> Result<Vec<String>, GatewayError>;
}

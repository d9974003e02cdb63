//! Deterministic provider adapter used by tests and as a safe default when
//! no upstream API key is configured.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::GatewayError;
use crate::request::ChatMessage;
use crate::response::{FinishReason, Usage};

use super::{AdapterResult, CallOptions, ProviderAdapter};

/// A scripted failure the mock adapter will raise on its next call, then
/// clear (so tests can assert recovery after one failure).
#[derive(Clone)]
pub enum ScriptedFailure {
    Transient,
    Permanent,
    RateLimited,
}

pub struct MockProviderAdapter {
    tag: String,
    call_count: AtomicU32,
    next_failure: Mutex<Option<ScriptedFailure>>,
}

impl MockProviderAdapter {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            call_count: AtomicU32::new(0),
            next_failure: Mutex::new(None),
        }
    }

    /// Arranges for the next call to fail with `failure`, then succeed
    /// again afterward.
    pub fn fail_next_call(&self, failure: ScriptedFailure) {
        *self.next_failure.lock().unwrap() = Some(failure);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn generate_chat(
        &self,
        messages: &[ChatMessage],
        opts: &CallOptions,
    ) -> Result<AdapterResult, GatewayError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = self.next_failure.lock().unwrap().take() {
            return Err(match failure {
                ScriptedFailure::Transient => {
                    GatewayError::Transient("mock: simulated upstream hiccup".into())
                }
                ScriptedFailure::Permanent => {
                    GatewayError::Permanent("mock: simulated bad request".into())
                }
                ScriptedFailure::RateLimited => GatewayError::RateLimited {
                    retry_after_ms: Some(50),
                },
            });
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::request::Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let content = format!("[{} mock reply to: {}]", self.tag, last_user);
        let prompt_tokens = messages.iter().map(|m| m.content.split_whitespace().count() as u32).sum();
        let completion_tokens = content.split_whitespace().count() as u32;

        Ok(AdapterResult {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        // Deterministic, cheap fallback embedding: byte histogram folded
        // into a fixed-length vector. Good enough for similarity tests,
        // not meant to approximate a real embedding model.
        let mut v = vec![0f32; 16];
        for (i, byte) in text.bytes().enumerate() {
            v[i % 16] += byte as f32;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        Ok(vec!["mock-small".to_string(), "mock-large".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Role;

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: Role::User,
            content: "how are you".into(),
            attachment_refs: vec![],
        }]
    }

    #[tokio::test]
    async fn generate_chat_echoes_last_user_message() {
        let adapter = MockProviderAdapter::new("primary");
        let result = adapter
            .generate_chat(&messages(), &CallOptions::default())
            .await
            .unwrap();
        assert!(result.content.contains("how are you"));
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn scripted_failure_fires_once() {
        let adapter = MockProviderAdapter::new("primary");
        adapter.fail_next_call(ScriptedFailure::Transient);
        let err = adapter
            .generate_chat(&messages(), &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transient(_)));

        let ok = adapter.generate_chat(&messages(), &CallOptions::default()).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_unit_norm() {
        let adapter = MockProviderAdapter::new("primary");
        let a = adapter.generate_embedding("hello").await.unwrap();
        let b = adapter.generate_embedding("hello").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}

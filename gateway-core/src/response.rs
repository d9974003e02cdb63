//! Response types returned by provider adapters and the gateway front-end.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::request::ProviderTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completed (or cached) chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub provider: ProviderTag,
    pub model: String,
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    #[serde(with = "duration_millis")]
    pub processing_time: Duration,
    pub cache_hit: bool,
    pub retry_attempt: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Aggregate result of a `/v1/batch` submission; preserves input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemResult {
    Ok { response: Response },
    Err { class: &'static str, message: String },
}

//! Request handlers for the JSON API.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use gateway_core::{BatchResponse, ChatMessage, Flag, Request, Response, Role};
use memory_pipeline::{ConversationContext, Intent, TemporalBucket};

use super::app::AppState;
use super::error::ApiError;

/// Cheap heuristic, no model call: a trailing question mark is the one
/// signal we can read off the raw text before the provider ever sees it.
fn classify_intent(content: &str) -> Intent {
    if content.trim_end().ends_with('?') {
        Intent::Question
    } else {
        Intent::General
    }
}

fn conversation_context(request: &Request) -> ConversationContext {
    let last_user = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("");
    ConversationContext {
        user_id: request.user_id,
        conversation_id: request.conversation_id.clone(),
        coaching_mode: request.coaching_mode.clone(),
        recent_topics: Vec::new(),
        intent: classify_intent(last_user),
        temporal_bucket: TemporalBucket::Recent,
        session_length: request.messages.len() as u32,
    }
}

/// Builds a system message summarizing the memories the retriever judged
/// relevant, inserted ahead of the caller's own messages so it informs the
/// provider without overriding any system prompt the caller supplied.
fn memory_system_message(memories: &[memory_pipeline::ScoredMemory]) -> Option<ChatMessage> {
    if memories.is_empty() {
        return None;
    }
    let mut content = String::from("Relevant things you already know about this user:\n");
    for scored in memories {
        content.push_str("- ");
        content.push_str(&scored.entry.content);
        content.push('\n');
    }
    Some(ChatMessage {
        role: Role::System,
        content,
        attachment_refs: Vec::new(),
    })
}

const RETRIEVAL_LIMIT: usize = 5;

/// Shared by `/v1/chat` and `/v1/stream`: prepends a memory-grounded system
/// message when the caller's `AdvancedMemory` rollout bucket is enabled, and
/// returns the text to later hand the background ingest supervisor.
pub(crate) async fn augment_with_memory(state: &AppState, request: &mut Request) -> (bool, Option<String>) {
    let memory_enabled = state.flags.is_enabled(Flag::AdvancedMemory, request.user_id);
    let last_user_message = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone());

    if memory_enabled {
        let context = conversation_context(request);
        let query = last_user_message.as_deref().unwrap_or("");
        if let Ok(memories) = state.memory.retrieve(&context, query, RETRIEVAL_LIMIT).await {
            if let Some(system_message) = memory_system_message(&memories) {
                request.messages.insert(0, system_message);
            }
        }
    }

    (memory_enabled, last_user_message)
}

/// Schedules background ingestion of the user's latest message, skipped
/// entirely when the caller isn't in the `AdvancedMemory` rollout bucket.
pub(crate) fn schedule_ingest(state: &AppState, memory_enabled: bool, user_id: i64, message: Option<String>) {
    if !memory_enabled {
        return;
    }
    if let Some(message) = message {
        state
            .memory_supervisor
            .spawn_ingest(state.memory.clone(), user_id, message);
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<Request>,
) -> Result<Json<Response>, ApiError> {
    let user_id = request.user_id;
    let (memory_enabled, last_user_message) = augment_with_memory(&state, &mut request).await;

    let response = state.gateway.submit(request).await?;

    schedule_ingest(&state, memory_enabled, user_id, last_user_message);

    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct BatchRequestBody {
    /// Client-supplied correlation id, echoed back unchanged.
    pub id: Option<String>,
    pub requests: Vec<Request>,
    /// When set, overrides every request's own `priority` for this batch.
    pub priority: Option<u8>,
}

#[derive(Serialize)]
pub struct BatchApiResponse {
    pub id: Option<String>,
    #[serde(flatten)]
    pub batch: BatchResponse,
}

pub async fn batch(
    State(state): State<Arc<AppState>>,
    Json(mut body): Json<BatchRequestBody>,
) -> Json<BatchApiResponse> {
    if let Some(priority) = body.priority {
        for request in &mut body.requests {
            request.priority = priority;
        }
    }
    let batch = state.gateway.submit_batch(body.requests).await;
    Json(BatchApiResponse { id: body.id, batch })
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: std::collections::HashMap<String, Vec<String>>,
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.gateway.list_models().await,
    })
}

#[derive(Serialize)]
pub struct AdminStatsResponse {
    #[serde(flatten)]
    pub gateway: gateway_core::GatewayStatsSnapshot,
    pub memory_ingest_failures: u64,
}

pub async fn admin_stats(State(state): State<Arc<AppState>>) -> Json<AdminStatsResponse> {
    Json(AdminStatsResponse {
        gateway: state.gateway.stats().await,
        memory_ingest_failures: state.memory_supervisor.failure_count(),
    })
}

#[derive(Serialize)]
pub struct CacheStatusResponse {
    pub entries: usize,
}

pub async fn admin_cache_status(State(state): State<Arc<AppState>>) -> Json<CacheStatusResponse> {
    let stats = state.gateway.stats().await;
    Json(CacheStatusResponse {
        entries: stats.cache_entries,
    })
}

#[derive(Serialize)]
pub struct CacheClearedResponse {
    pub cleared: bool,
}

pub async fn admin_cache_clear(State(state): State<Arc<AppState>>) -> Json<CacheClearedResponse> {
    state.gateway.clear_cache().await;
    Json(CacheClearedResponse { cleared: true })
}

#[derive(Deserialize)]
pub struct CacheInvalidatePrefixBody {
    pub prefix: String,
}

#[derive(Serialize)]
pub struct CacheInvalidatePrefixResponse {
    pub removed: usize,
}

pub async fn admin_cache_invalidate_prefix(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CacheInvalidatePrefixBody>,
) -> Json<CacheInvalidatePrefixResponse> {
    let removed = state.gateway.invalidate_cache_prefix(&body.prefix).await;
    Json(CacheInvalidatePrefixResponse { removed })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<gateway_core::HealthStatus> {
    Json(state.gateway.health())
}

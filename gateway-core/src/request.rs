//! Request types accepted by the gateway front-end.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Role of a single turn in the conversation sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
}

/// Which upstream to route to. `auto_select` on [`Request`] lets the gateway
/// pick when the caller has no preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Primary,
    Secondary,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::Primary => "primary",
            ProviderTag::Secondary => "secondary",
        }
    }
}

/// A single chat-completion request submitted to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: String,
    pub provider: ProviderTag,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub user_id: i64,
    pub conversation_id: String,
    pub coaching_mode: String,
    /// 1 = highest priority, 5 = lowest.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub auto_select: bool,

    #[serde(skip, default = "Instant::now")]
    pub submitted_at: Instant,
    #[serde(skip)]
    pub deadline: Option<Instant>,
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

fn default_priority() -> u8 {
    3
}

/// Errors raised while constructing/validating a [`Request`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestValidationError {
    #[error("messages must not be empty")]
    EmptyMessages,
    #[error("last message must have role=user")]
    LastMessageNotUser,
    #[error("priority must be in 1..=5, got {0}")]
    PriorityOutOfRange(u8),
}

impl Request {
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        let Some(last) = self.messages.last() else {
            return Err(RequestValidationError::EmptyMessages);
        };
        if last.role != Role::User {
            return Err(RequestValidationError::LastMessageNotUser);
        }
        if !(1..=5).contains(&self.priority) {
            return Err(RequestValidationError::PriorityOutOfRange(self.priority));
        }
        Ok(())
    }

    /// Remaining time before `deadline`, or `None` if there is no deadline
    /// or it has already passed.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

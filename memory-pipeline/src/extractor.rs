//! Memory Extractor: decides whether a conversation turn is worth
//! remembering, either via explicit triggers ("remember that...") or by
//! asking the provider for a structured verdict.

use std::sync::Arc;

use chrono::Utc;
use gateway_core::{CallOptions, ChatMessage, ProviderAdapter, Role};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::model::{MemoryCategory, MemoryEntry};

const EXPLICIT_TRIGGERS: &[&str] = &[
    "remember that",
    "remember this",
    "don't forget",
    "keep in mind",
    "my goal is",
    "i want you to know",
];

/// Structured verdict the extraction prompt asks the model to return.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionVerdict {
    pub should_remember: bool,
    pub content: Option<String>,
    pub category: Option<MemoryCategory>,
    /// 0.0 - 1.0
    pub importance: Option<f32>,
    pub keywords: Vec<String>,
}

impl ExtractionVerdict {
    fn conservative_no() -> Self {
        Self {
            should_remember: false,
            content: None,
            category: None,
            importance: None,
            keywords: Vec::new(),
        }
    }
}

pub struct MemoryExtractor {
    provider: Arc<dyn ProviderAdapter>,
    model: String,
}

impl MemoryExtractor {
    pub fn new(provider: Arc<dyn ProviderAdapter>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Returns the category an explicit trigger phrase implies, or `None`
    /// if no trigger phrase is present. Checked before falling back to
    /// LLM-assisted inference, since it's free and unambiguous. Every
    /// explicit trigger is an instruction from the user to remember
    /// something, regardless of its subject.
    pub fn detect_explicit_trigger(message: &str) -> Option<MemoryCategory> {
        let lower = message.to_lowercase();
        if EXPLICIT_TRIGGERS.iter().any(|t| lower.contains(t)) {
            return Some(MemoryCategory::Instruction);
        }
        None
    }

    /// Runs the full extraction decision for one user message: explicit
    /// trigger first, then LLM-assisted inference. Returns `None` when
    /// nothing is worth remembering.
    pub async fn extract(
        &self,
        user_id: i64,
        message: &str,
    ) -> Result<Option<MemoryEntry>, MemoryError> {
        let verdict = if let Some(category) = Self::detect_explicit_trigger(message) {
            ExtractionVerdict {
                should_remember: true,
                content: Some(message.to_string()),
                category: Some(category),
                importance: Some(0.9),
                keywords: keyword_candidates(message),
            }
        } else {
            self.infer_verdict(message).await?
        };

        if !verdict.should_remember {
            return Ok(None);
        }

        let content = verdict.content.unwrap_or_else(|| message.to_string());
        let embedding = self
            .provider
            .generate_embedding(&content)
            .await
            .map_err(|e| MemoryError::Extraction(e.to_string()))?;

        Ok(Some(MemoryEntry {
            id: Uuid::new_v4().to_string(),
            user_id,
            content: content.clone(),
            category: verdict.category.unwrap_or(MemoryCategory::Context),
            importance: verdict.importance.unwrap_or(0.5).clamp(0.0, 1.0),
            keywords: if verdict.keywords.is_empty() {
                keyword_candidates(&content)
            } else {
                verdict.keywords
            },
            embedding,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            access_count: 0,
            last_accessed_at: None,
            active: true,
            semantic_hash: String::new(),
            update_count: 0,
        }))
    }

    async fn infer_verdict(&self, message: &str) -> Result<ExtractionVerdict, MemoryError> {
        let prompt = format!(
            "Decide whether this user message contains a durable fact worth \
             remembering for future coaching sessions (a preference, personal \
             detail, ongoing instruction, or context). Respond with JSON only: \
             {{\"should_remember\": bool, \"content\": string, \"category\": \
             \"preference\"|\"personal_info\"|\"context\"|\"instruction\", \
             \"importance\": number 0-1, \"keywords\": [string]}}.\n\nMessage: {message}"
        );
        let messages = vec![ChatMessage {
            role: Role::User,
            content: prompt,
            attachment_refs: vec![],
        }];
        let result = self
            .provider
            .generate_chat(&messages, &CallOptions { model: self.model.clone(), ..Default::default() })
            .await
            .map_err(|e| MemoryError::Extraction(e.to_string()))?;

        Ok(parse_verdict(&result.content))
    }
}

/// Parses a model's verdict response defensively: strips Markdown code
/// fences, extracts the first balanced `{...}` span, repairs a trailing
/// comma before the closing brace, and falls back to a conservative "don't
/// remember" verdict if the result still doesn't parse as JSON.
fn parse_verdict(raw: &str) -> ExtractionVerdict {
    let stripped = strip_code_fences(raw);
    let Some(json_span) = extract_balanced_braces(&stripped) else {
        return ExtractionVerdict::conservative_no();
    };
    let repaired = repair_trailing_commas(&json_span);

    let parsed: serde_json::Value = match serde_json::from_str(&repaired) {
        Ok(v) => v,
        Err(_) => return ExtractionVerdict::conservative_no(),
    };

    let should_remember = parsed
        .get("should_remember")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if !should_remember {
        return ExtractionVerdict::conservative_no();
    }

    let content = parsed
        .get("content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let category = parsed
        .get("category")
        .and_then(|v| v.as_str())
        .and_then(category_from_str);
    let importance = parsed
        .get("importance")
        .and_then(|v| v.as_f64())
        .map(|f| f as f32);
    let keywords = parsed
        .get("keywords")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    ExtractionVerdict {
        should_remember: true,
        content,
        category,
        importance,
        keywords,
    }
}

fn category_from_str(s: &str) -> Option<MemoryCategory> {
    match s {
        "preference" => Some(MemoryCategory::Preference),
        "personal_info" => Some(MemoryCategory::PersonalInfo),
        "context" => Some(MemoryCategory::Context),
        "instruction" => Some(MemoryCategory::Instruction),
        _ => None,
    }
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

fn extract_balanced_braces(s: &str) -> Option<String> {
    let start = s.find('{')?;
    let mut depth = 0i32;
    for (i, c) in s[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(s[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn repair_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn keyword_candidates(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3)
        .take(8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::MockProviderAdapter;

    #[test]
    fn detects_explicit_remember_trigger() {
        let category = MemoryExtractor::detect_explicit_trigger("Please remember that I'm vegetarian");
        assert_eq!(category, Some(MemoryCategory::Instruction));
    }

    #[test]
    fn detects_goal_trigger_as_instruction() {
        let category = MemoryExtractor::detect_explicit_trigger("My goal is to run a marathon");
        assert_eq!(category, Some(MemoryCategory::Instruction));
    }

    #[test]
    fn no_trigger_for_ordinary_message() {
        assert_eq!(MemoryExtractor::detect_explicit_trigger("what's the weather"), None);
    }

    #[test]
    fn parse_verdict_handles_code_fence_and_trailing_comma() {
        let raw = "```json\n{\"should_remember\": true, \"content\": \"likes tea\", \"category\": \"preference\", \"importance\": 0.6, \"keywords\": [\"tea\",],}\n```";
        let verdict = parse_verdict(raw);
        assert!(verdict.should_remember);
        assert_eq!(verdict.content.as_deref(), Some("likes tea"));
        assert_eq!(verdict.category, Some(MemoryCategory::Preference));
    }

    #[test]
    fn parse_verdict_falls_back_conservatively_on_garbage() {
        let verdict = parse_verdict("not json at all");
        assert!(!verdict.should_remember);
    }

    #[test]
    fn parse_verdict_respects_should_remember_false() {
        let verdict = parse_verdict("{\"should_remember\": false}");
        assert!(!verdict.should_remember);
    }

    #[tokio::test]
    async fn explicit_trigger_short_circuits_provider_inference() {
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let extractor = MemoryExtractor::new(provider, "mock-small");
        let entry = extractor
            .extract(1, "remember that I run every morning")
            .await
            .unwrap()
            .expect("should remember");
        assert_eq!(entry.user_id, 1);
        assert!(!entry.embedding.is_empty());
        assert_eq!(entry.category, MemoryCategory::Instruction);
        assert!(entry.importance >= 0.9);
    }

    #[tokio::test]
    async fn non_trigger_message_falls_through_to_provider_and_mock_says_no() {
        let provider = Arc::new(MockProviderAdapter::new("primary"));
        let extractor = MemoryExtractor::new(provider, "mock-small");
        // MockProviderAdapter's generate_chat echoes the prompt back, which
        // is not valid verdict JSON, so this must fall back conservatively.
        let entry = extractor.extract(1, "what time is it").await.unwrap();
        assert!(entry.is_none());
    }
}

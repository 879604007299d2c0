//! Shared types: conversation messages and the search collaborator's
//! result shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role tag for chat-completion messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in the chat-completion contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One matching transcript segment from the search backend.
///
/// Mirrors the fields the engine actually consumes; enrichment fields the
/// backend may omit are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSegment {
    pub content_id: Uuid,
    pub segment_index: i32,
    pub text: String,
    pub score: f32,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chamber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committee: Option<String>,
}

/// Search backend response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    #[serde(default)]
    pub results: Vec<ResultSegment>,
    pub total_returned: usize,
    #[serde(default)]
    pub has_more: bool,
}

impl SearchResponse {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// All text segments attributable to one speaker, for one topic.
/// Built once per sentiment request and discarded afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerStatement {
    /// Normalized key used for grouping and in the returned score map.
    pub speaker_id: String,
    /// Display name as it appeared in the results.
    pub display_name: String,
    pub statements: Vec<String>,
}

/// Normalize a speaker name into the key used for grouping and scoring.
pub fn normalize_speaker_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_key_normalization() {
        assert_eq!(normalize_speaker_key("  Elizabeth Warren "), "elizabeth warren");
        assert_eq!(
            normalize_speaker_key("elizabeth warren"),
            normalize_speaker_key("ELIZABETH WARREN")
        );
    }

    #[test]
    fn search_response_deserializes_without_optional_fields() {
        let json = r#"{
            "query": "gun control",
            "results": [{
                "content_id": "550e8400-e29b-41d4-a716-446655440000",
                "segment_index": 3,
                "text": "We must act on firearm safety.",
                "score": 0.87,
                "content_type": "floor_speech"
            }],
            "total_returned": 1,
            "has_more": false
        }"#;
        let resp: SearchResponse = serde_json::from_str(json).expect("valid response");
        assert_eq!(resp.results.len(), 1);
        assert!(resp.results[0].speaker_name.is_none());
        assert!(!resp.is_empty());
    }
}

//! Turn intent classification relative to the currently-held result set.
//!
//! An ordered decision list, evaluated top to bottom with the first match
//! winning. No learned model: keyword families plus a cheap token-overlap
//! relatedness proxy against the previous search query.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::IntentConfig;
use crate::types::{ChatMessage, ResultSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    NewSearch,
    Refinement,
    Expansion,
    FollowUp,
    Clarification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefinementType {
    Speaker,
    Topic,
    Date,
    Type,
    Chamber,
    Multiple,
}

/// Filter hints extracted from refinement phrasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFilters {
    pub speaker: Option<String>,
    pub content_types: Vec<String>,
    pub chamber: Option<String>,
}

impl ExtractedFilters {
    fn count(&self) -> usize {
        usize::from(self.speaker.is_some())
            + usize::from(!self.content_types.is_empty())
            + usize::from(self.chamber.is_some())
    }
}

/// Classification of one conversational turn. Recomputed every turn; it
/// depends on the live result set and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: QueryIntent,
    pub confidence: f32,
    pub refinement_type: Option<RefinementType>,
    pub filters: ExtractedFilters,
    pub preserve_existing_results: bool,
    pub merge_with_existing: bool,
    pub reasoning: String,
}

impl IntentResult {
    /// Only a follow-up suppresses invoking the search backend.
    pub fn should_trigger_search(&self) -> bool {
        self.intent != QueryIntent::FollowUp
    }
}

// Case-insensitivity covers the title only; the optional second name word
// stays strictly capitalized so trailing prose is not swallowed.
static SPEAKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:senator|sen\.|representative|rep\.|congressman|congresswoman)\s+([A-Za-z]+(?:\s+[A-Z][a-z]+)?)",
    )
    .expect("speaker regex is valid")
});

static FROM_SPEAKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:from|by)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").expect("from-speaker regex is valid")
});

const NEW_TOPIC_PHRASES: [&str; 7] = [
    "new topic",
    "different topic",
    "something else",
    "forget that",
    "never mind that",
    "start over",
    "changing the subject",
];

const REFINEMENT_KEYWORDS: [&str; 8] = [
    "only", "just the", "filter", "narrow", "exclude", "limit to", "restrict", "just show",
];

const RESULT_REFERENCES: [&str; 3] = ["these results", "those results", "the results"];

const FOLLOW_UP_PHRASES: [&str; 8] = [
    "which of these",
    "which one",
    "summarize",
    "why did",
    "what did they mean",
    "explain that",
    "tell me more about the",
    "what does that mean",
];

const EXPANSION_PHRASES: [&str; 6] = [
    "what about",
    "also show",
    "related to",
    "how about",
    "and also",
    "in addition",
];

pub struct IntentClassifier {
    config: IntentConfig,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(IntentConfig::default())
    }
}

impl IntentClassifier {
    pub fn new(config: IntentConfig) -> Self {
        Self { config }
    }

    /// Classify the purpose of `prompt` relative to the conversation so far
    /// and the currently displayed results.
    pub fn classify(
        &self,
        prompt: &str,
        _previous_messages: &[ChatMessage],
        current_results: &[ResultSegment],
        last_search_query: Option<&str>,
    ) -> IntentResult {
        let prompt_lower = prompt.trim().to_lowercase();
        let has_results = !current_results.is_empty();

        // 1. Explicit topic change.
        if NEW_TOPIC_PHRASES.iter().any(|p| prompt_lower.contains(p)) {
            return IntentResult {
                intent: QueryIntent::NewSearch,
                confidence: 0.9,
                refinement_type: None,
                filters: ExtractedFilters::default(),
                preserve_existing_results: false,
                merge_with_existing: false,
                reasoning: "Explicit new-topic phrasing".to_string(),
            };
        }

        // 2. Refinement keywords or a textual reference to the result set.
        let has_refinement_language = REFINEMENT_KEYWORDS.iter().any(|k| prompt_lower.contains(k));
        let references_results = RESULT_REFERENCES.iter().any(|r| prompt_lower.contains(r));
        if has_refinement_language || references_results {
            let filters = extract_filters(prompt);
            return IntentResult {
                refinement_type: Some(refinement_type_for(&filters)),
                intent: QueryIntent::Refinement,
                confidence: 0.85,
                filters,
                preserve_existing_results: true,
                merge_with_existing: false,
                reasoning: "Refinement language over the current results".to_string(),
            };
        }

        // 3. Follow-up question about results that are actually on screen.
        if has_results && FOLLOW_UP_PHRASES.iter().any(|p| prompt_lower.contains(p)) {
            return IntentResult {
                intent: QueryIntent::FollowUp,
                confidence: 0.8,
                refinement_type: None,
                filters: ExtractedFilters::default(),
                preserve_existing_results: true,
                merge_with_existing: false,
                reasoning: "Follow-up about the existing result set".to_string(),
            };
        }

        // 4. Expansion phrasing.
        if EXPANSION_PHRASES.iter().any(|p| prompt_lower.contains(p)) {
            return IntentResult {
                intent: QueryIntent::Expansion,
                confidence: 0.75,
                refinement_type: None,
                filters: ExtractedFilters::default(),
                preserve_existing_results: true,
                merge_with_existing: true,
                reasoning: "Expansion phrasing".to_string(),
            };
        }

        // 5. Token overlap with the previous search query.
        if let Some(last_query) = last_search_query {
            let overlap = self.token_overlap(&prompt_lower, last_query);
            if overlap > self.config.related_overlap_threshold {
                let filters = extract_filters(prompt);
                if filters.count() > 0 {
                    return IntentResult {
                        refinement_type: Some(refinement_type_for(&filters)),
                        intent: QueryIntent::Refinement,
                        confidence: 0.7,
                        filters,
                        preserve_existing_results: true,
                        merge_with_existing: false,
                        reasoning: format!(
                            "Related to previous search ({}% token overlap) with filter language",
                            (overlap * 100.0) as u32
                        ),
                    };
                }
                return IntentResult {
                    intent: QueryIntent::Expansion,
                    confidence: 0.65,
                    refinement_type: None,
                    filters,
                    preserve_existing_results: true,
                    merge_with_existing: true,
                    reasoning: format!(
                        "Related to previous search ({}% token overlap)",
                        (overlap * 100.0) as u32
                    ),
                };
            }
        }

        // 6. Default: a fresh search. Keep the old results on screen while
        // it runs only when there is something on screen to keep.
        IntentResult {
            intent: QueryIntent::NewSearch,
            confidence: 0.6,
            refinement_type: None,
            filters: ExtractedFilters::default(),
            preserve_existing_results: has_results,
            merge_with_existing: false,
            reasoning: "No prior-turn signal; treating as a new search".to_string(),
        }
    }

    /// Word-level overlap between two texts as a share of the smaller token
    /// set. Tokens at or below `min_token_len` chars are ignored.
    fn token_overlap(&self, a: &str, b: &str) -> f32 {
        let tokens_a = self.tokens(a);
        let tokens_b = self.tokens(b);
        if tokens_a.is_empty() || tokens_b.is_empty() {
            return 0.0;
        }
        let shared = tokens_a.intersection(&tokens_b).count();
        shared as f32 / tokens_a.len().min(tokens_b.len()) as f32
    }

    fn tokens(&self, text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_string()
            })
            .filter(|w| w.len() > self.config.min_token_len)
            .collect()
    }
}

fn extract_filters(prompt: &str) -> ExtractedFilters {
    let prompt_lower = prompt.to_lowercase();

    let speaker = SPEAKER_RE
        .captures(prompt)
        .or_else(|| FROM_SPEAKER_RE.captures(prompt))
        .map(|c| c[1].trim().to_string());

    let mut content_types = Vec::new();
    if prompt_lower.contains("hearing") {
        content_types.push("hearing".to_string());
    }
    if prompt_lower.contains("floor speech") || prompt_lower.contains("speeches") {
        content_types.push("floor_speech".to_string());
    }
    if prompt_lower.contains("vote") {
        content_types.push("vote".to_string());
    }

    let chamber = if prompt_lower.contains("senate") {
        Some("senate".to_string())
    } else if prompt_lower.contains("house") {
        Some("house".to_string())
    } else {
        None
    };

    ExtractedFilters {
        speaker,
        content_types,
        chamber,
    }
}

fn refinement_type_for(filters: &ExtractedFilters) -> RefinementType {
    if filters.count() > 1 {
        return RefinementType::Multiple;
    }
    if filters.speaker.is_some() {
        RefinementType::Speaker
    } else if !filters.content_types.is_empty() {
        RefinementType::Type
    } else if filters.chamber.is_some() {
        RefinementType::Chamber
    } else {
        RefinementType::Topic
    }
}

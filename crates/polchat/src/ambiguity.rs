//! Ambiguity detection for raw user queries.
//!
//! Pure, total classification: a query is scored against five independent
//! rule families, one per category. Rules are data, not control flow, so a
//! family can grow without touching the scoring loop.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::clarification;

/// Confidence at or above which a query is treated as ambiguous.
pub const PROBABLY_AMBIGUOUS: f32 = 0.5;
/// Reserved tuning thresholds; not consulted by default.
pub const SLIGHTLY_AMBIGUOUS: f32 = 0.3;
pub const DEFINITELY_AMBIGUOUS: f32 = 0.8;

/// Queries shorter than this (chars) get a flat bonus once any rule matched.
const SHORT_QUERY_LEN: usize = 20;
const SHORT_QUERY_BONUS: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityCategory {
    VagueTopic,
    MissingReferent,
    ScopeUnclear,
    TimeAmbiguous,
    MultipleInterpretations,
}

impl AmbiguityCategory {
    /// Weight each matching rule in this family contributes.
    pub const fn weight(self) -> f32 {
        match self {
            Self::VagueTopic => 0.4,
            Self::MissingReferent => 0.5,
            Self::ScopeUnclear => 0.3,
            Self::TimeAmbiguous => 0.2,
            Self::MultipleInterpretations => 0.25,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VagueTopic => "vague_topic",
            Self::MissingReferent => "missing_referent",
            Self::ScopeUnclear => "scope_unclear",
            Self::TimeAmbiguous => "time_ambiguous",
            Self::MultipleInterpretations => "multiple_interpretations",
        }
    }
}

/// Result of one detection pass. Immutable, recomputed per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguityDetection {
    pub is_ambiguous: bool,
    pub categories: Vec<AmbiguityCategory>,
    pub confidence: f32,
    pub matched_patterns: Vec<String>,
}

impl AmbiguityDetection {
    fn unambiguous() -> Self {
        Self {
            is_ambiguous: false,
            categories: Vec::new(),
            confidence: 0.0,
            matched_patterns: Vec::new(),
        }
    }
}

struct PatternRule {
    name: &'static str,
    regex: Regex,
}

impl PatternRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("ambiguity rule regex is valid"),
        }
    }
}

struct RuleFamily {
    category: AmbiguityCategory,
    rules: Vec<PatternRule>,
    /// When this matches the query, the whole family is skipped: the query
    /// already carries the specificity the family is probing for.
    suppressor: Option<Regex>,
}

static RULE_FAMILIES: LazyLock<Vec<RuleFamily>> = LazyLock::new(|| {
    let broad_topics = clarification::topic_keys().join("|");
    vec![
        RuleFamily {
            category: AmbiguityCategory::VagueTopic,
            rules: vec![
                PatternRule::new(
                    "bare_topic",
                    &format!(
                        r"^(?:(?:tell me about|what about|info on|how about)\s+)?(?:the\s+)?(?:{broad_topics})\??$"
                    ),
                ),
                PatternRule::new("broad_domain", r"^(?:politics|congress|legislation|government|policy)\??$"),
                PatternRule::new(
                    "open_ended",
                    r"^(?:what'?s|what is)\s+(?:going on|happening|new)(?:\s+in\s+(?:congress|washington|politics))?\??$",
                ),
            ],
            suppressor: None,
        },
        RuleFamily {
            category: AmbiguityCategory::MissingReferent,
            rules: vec![
                PatternRule::new(
                    "bare_referent",
                    r"\b(?:the|that|this)\s+(?:bill|act|law|legislation|amendment|vote|hearing)\b",
                ),
                PatternRule::new(
                    "bare_pronoun",
                    r"^(?:what|when|why|how|where)\s+(?:does|did|do|will|would)\s+(?:he|she|they|it)\b",
                ),
                PatternRule::new(
                    "unnamed_member",
                    r"\b(?:the|that)\s+(?:senator|congressman|congresswoman|representative|lawmaker)\b",
                ),
            ],
            // A named act, amendment, or bill number establishes the referent.
            suppressor: Some(
                Regex::new(r"(?:h\.?\s?r\.?\s*\d+|\bs\.\s*\d+|\b\w+\s+act\b|\b\w+\s+amendment\b)")
                    .expect("referent suppressor regex is valid"),
            ),
        },
        RuleFamily {
            category: AmbiguityCategory::ScopeUnclear,
            rules: vec![
                PatternRule::new(
                    "collective_opinion",
                    r"\b(?:congress|lawmakers|politicians|legislators|members)\b.*\b(?:think|say|feel|believe|stand|support|oppose)\b",
                ),
                PatternRule::new(
                    "unscoped_position",
                    r"^(?:what (?:are|is) the)\s+(?:position|stance|view)s?\b",
                ),
                PatternRule::new("party_split", r"\b(?:both sides|each party|the parties)\b"),
            ],
            suppressor: None,
        },
        RuleFamily {
            category: AmbiguityCategory::TimeAmbiguous,
            rules: vec![
                PatternRule::new(
                    "relative_time",
                    r"\b(?:recently|lately|these days|nowadays|currently|right now)\b",
                ),
                PatternRule::new(
                    "unanchored_latest",
                    r"\b(?:latest|recent|current|new)\s+(?:bills?|legislation|votes?|hearings?|news)\b",
                ),
            ],
            // Explicit year, month, or congress number anchors the time frame.
            suppressor: Some(
                Regex::new(
                    r"(?:\b(?:19|20)\d{2}\b|\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\b|\b\d{2,3}(?:st|nd|rd|th)\s+congress\b)",
                )
                .expect("time suppressor regex is valid"),
            ),
        },
        RuleFamily {
            category: AmbiguityCategory::MultipleInterpretations,
            rules: vec![
                PatternRule::new("term_reform", r"^(?:\w+\s+)?reform\??$"),
                PatternRule::new("term_rights", r"\brights\b"),
                PatternRule::new("term_security", r"^(?:national\s+)?security\??$"),
                PatternRule::new("term_regulation", r"^regulations?\??$"),
                PatternRule::new("term_budget", r"^(?:the\s+)?budget\??$"),
                PatternRule::new("term_border", r"^(?:the\s+)?border\??$"),
            ],
            suppressor: None,
        },
    ]
});

/// Classify a raw query into zero or more ambiguity categories.
///
/// `turn_index` is the zero-based position of this query in the
/// conversation; referent rules only apply to an opening turn, since "the
/// bill" stops being ambiguous once a bill has plausibly been established.
pub fn detect(query: &str, turn_index: usize) -> AmbiguityDetection {
    let normalized = query.trim().to_lowercase();

    // Empty or punctuation-only queries are never ambiguous.
    if !normalized.chars().any(|c| c.is_alphanumeric()) {
        return AmbiguityDetection::unambiguous();
    }

    let mut confidence: f32 = 0.0;
    let mut categories = Vec::new();
    let mut matched_patterns = Vec::new();

    for family in RULE_FAMILIES.iter() {
        if family.category == AmbiguityCategory::MissingReferent && turn_index != 0 {
            continue;
        }
        if let Some(suppressor) = &family.suppressor {
            if suppressor.is_match(&normalized) {
                continue;
            }
        }

        let mut family_matched = false;
        for rule in &family.rules {
            if rule.regex.is_match(&normalized) {
                confidence += family.category.weight();
                matched_patterns.push(format!("{}:{}", family.category.as_str(), rule.name));
                family_matched = true;
            }
        }
        if family_matched {
            categories.push(family.category);
        }
    }

    if !matched_patterns.is_empty() && normalized.chars().count() < SHORT_QUERY_LEN {
        confidence += SHORT_QUERY_BONUS;
    }

    let confidence = confidence.clamp(0.0, 1.0);
    AmbiguityDetection {
        is_ambiguous: confidence >= PROBABLY_AMBIGUOUS,
        categories,
        confidence,
        matched_patterns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_topic_is_ambiguous() {
        for topic in clarification::topic_keys() {
            let detection = detect(topic, 0);
            assert!(detection.is_ambiguous, "expected '{}' to be ambiguous", topic);
            assert!(
                detection.categories.contains(&AmbiguityCategory::VagueTopic),
                "expected vague_topic for '{}'",
                topic
            );
        }
    }

    #[test]
    fn specific_query_is_not_ambiguous() {
        let query = "What did Elizabeth Warren say about gun background checks in March 2023";
        assert!(query.len() >= 25);
        let detection = detect(query, 0);
        assert!(!detection.is_ambiguous, "matched: {:?}", detection.matched_patterns);
    }

    #[test]
    fn missing_referent_only_on_first_turn() {
        let query = "What does the bill say?";
        let first = detect(query, 0);
        assert!(first.categories.contains(&AmbiguityCategory::MissingReferent));
        assert!(first.is_ambiguous);

        let later = detect(query, 2);
        assert!(!later.categories.contains(&AmbiguityCategory::MissingReferent));
    }

    #[test]
    fn named_act_suppresses_referent_rules() {
        let detection = detect("What does the Inflation Reduction Act bill text say", 0);
        assert!(!detection.categories.contains(&AmbiguityCategory::MissingReferent));
    }

    #[test]
    fn year_suppresses_time_rules() {
        let detection = detect("recent votes in 2023 on farm subsidies", 0);
        assert!(!detection.categories.contains(&AmbiguityCategory::TimeAmbiguous));
    }

    #[test]
    fn empty_and_punctuation_queries_short_circuit() {
        for query in ["", "   ", "???", "!!"] {
            let detection = detect(query, 0);
            assert!(!detection.is_ambiguous);
            assert_eq!(detection.confidence, 0.0);
        }
    }

    #[test]
    fn confidence_is_clamped() {
        for query in [
            "taxes",
            "what do lawmakers think about the bill these days",
            "the budget",
            "rights",
            "What did Senator Smith say about S. 1234 in January 2024",
        ] {
            let detection = detect(query, 0);
            assert!((0.0..=1.0).contains(&detection.confidence), "query: {}", query);
        }
    }

    #[test]
    fn detection_is_idempotent() {
        let a = detect("taxes", 0);
        let b = detect("taxes", 0);
        assert_eq!(a.is_ambiguous, b.is_ambiguous);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.matched_patterns, b.matched_patterns);
    }
}

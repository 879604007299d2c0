//! Broadening plans for searches that returned nothing.
//!
//! Two levers, applied in a fixed order that keeps the episode explainable:
//! synonym substitution for common policy terms, then filter removal in a
//! most-restrictive-first priority order. Attempts are strictly sequential
//! and capped; the user always gets a one-sentence account of what changed.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::action::SearchActionParams;

/// Hard ceiling on broadened retries within one failed-search episode.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Filters eligible for removal, most restrictive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    From,
    To,
    Speaker,
    Committee,
    Congress,
    Chamber,
    Type,
}

impl FilterKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
            Self::Speaker => "speaker",
            Self::Committee => "committee",
            Self::Congress => "congress",
            Self::Chamber => "chamber",
            Self::Type => "type",
        }
    }

    /// User-facing name for the transparency message.
    const fn display_name(self) -> &'static str {
        match self {
            Self::From => "start date filter",
            Self::To => "end date filter",
            Self::Speaker => "speaker filter",
            Self::Committee => "committee filter",
            Self::Congress => "congress filter",
            Self::Chamber => "chamber filter",
            Self::Type => "content type filter",
        }
    }
}

/// Fixed removal priority. Order is total and does not depend on how the
/// params were constructed.
pub const FILTER_PRIORITY: [FilterKey; 7] = [
    FilterKey::From,
    FilterKey::To,
    FilterKey::Speaker,
    FilterKey::Committee,
    FilterKey::Congress,
    FilterKey::Chamber,
    FilterKey::Type,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymSuggestion {
    pub term: String,
    pub synonyms: Vec<String>,
}

/// Broadening plan for one retry attempt. Recomputed per attempt from the
/// prior attempt's params and the running removal list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategy {
    pub synonym_suggestions: Vec<SynonymSuggestion>,
    pub filter_to_remove: Option<FilterKey>,
    /// Quick retry query with the first synonym substituted in.
    pub simplified_query: Option<String>,
    pub has_filters_to_remove: bool,
    pub retry_attempt: u32,
}

/// Common policy terms and their alternative phrasings. Key order matters:
/// the first key found in the query supplies the quick-retry substitution.
static SYNONYM_TABLE: LazyLock<Vec<(&'static str, Vec<&'static str>)>> = LazyLock::new(|| {
    vec![
        (
            "gun control",
            vec!["firearm regulation", "gun safety laws", "second amendment"],
        ),
        (
            "climate change",
            vec!["global warming", "carbon emissions", "clean energy"],
        ),
        (
            "healthcare",
            vec!["health care", "health insurance", "medical coverage"],
        ),
        (
            "immigration",
            vec!["border policy", "asylum", "migrant policy"],
        ),
        ("abortion", vec!["reproductive rights", "roe v wade"]),
        ("taxes", vec!["taxation", "tax policy", "tax reform"]),
        ("minimum wage", vec!["wage floor", "living wage"]),
        (
            "social security",
            vec!["retirement benefits", "entitlement programs"],
        ),
    ]
});

/// All table entries whose key appears in the query, case-insensitively.
pub fn get_synonyms_for_query(q: &str) -> Vec<SynonymSuggestion> {
    let q_lower = q.to_lowercase();
    SYNONYM_TABLE
        .iter()
        .filter(|(term, _)| q_lower.contains(term))
        .map(|(term, synonyms)| SynonymSuggestion {
            term: (*term).to_string(),
            synonyms: synonyms.iter().map(|s| (*s).to_string()).collect(),
        })
        .collect()
}

/// Substitute the first matching term's first alternative into the query.
pub fn get_first_synonym_query(q: &str) -> Option<String> {
    let q_lower = q.to_lowercase();
    for (term, synonyms) in SYNONYM_TABLE.iter() {
        if q_lower.contains(term) {
            let replacement = synonyms.first()?;
            return case_insensitive_replace(q, term, replacement);
        }
    }
    None
}

fn case_insensitive_replace(text: &str, pattern: &str, replacement: &str) -> Option<String> {
    let pos = text.to_lowercase().find(&pattern.to_lowercase())?;
    let mut result = String::with_capacity(text.len() + replacement.len());
    result.push_str(&text[..pos]);
    result.push_str(replacement);
    result.push_str(&text[pos + pattern.len()..]);
    Some(result)
}

fn filter_present(params: &SearchActionParams, key: FilterKey) -> bool {
    match key {
        FilterKey::From => params.from.is_some(),
        FilterKey::To => params.to.is_some(),
        FilterKey::Speaker => params.speaker.is_some(),
        FilterKey::Committee => params.committee.is_some(),
        FilterKey::Congress => params.congress.is_some(),
        FilterKey::Chamber => params.chamber.is_some(),
        FilterKey::Type => params.content_type.is_some(),
    }
}

/// First filter in priority order that is present and not already removed.
pub fn get_next_filter_to_remove(
    params: &SearchActionParams,
    already_removed: &[FilterKey],
) -> Option<FilterKey> {
    FILTER_PRIORITY
        .iter()
        .copied()
        .find(|key| filter_present(params, *key) && !already_removed.contains(key))
}

/// Clear one filter from the params, returning the broadened copy.
pub fn remove_filter(params: &SearchActionParams, key: FilterKey) -> SearchActionParams {
    let mut broadened = params.clone();
    match key {
        FilterKey::From => broadened.from = None,
        FilterKey::To => broadened.to = None,
        FilterKey::Speaker => broadened.speaker = None,
        FilterKey::Committee => broadened.committee = None,
        FilterKey::Congress => broadened.congress = None,
        FilterKey::Chamber => broadened.chamber = None,
        FilterKey::Type => broadened.content_type = None,
    }
    broadened
}

/// Produce the broadening plan for the given attempt.
pub fn plan(
    params: &SearchActionParams,
    attempt: u32,
    already_removed: &[FilterKey],
    synonyms_already_tried: bool,
) -> RetryStrategy {
    let synonym_suggestions = if synonyms_already_tried {
        Vec::new()
    } else {
        get_synonyms_for_query(&params.q)
    };
    let filter_to_remove = get_next_filter_to_remove(params, already_removed);
    let simplified_query = if synonyms_already_tried {
        None
    } else {
        get_first_synonym_query(&params.q)
    };

    RetryStrategy {
        has_filters_to_remove: filter_to_remove.is_some(),
        synonym_suggestions,
        filter_to_remove,
        simplified_query,
        retry_attempt: attempt,
    }
}

/// Build the escalating model prompt for a retry attempt.
///
/// Attempt 1 prefers synonym substitution plus dropping the top-priority
/// filter; attempt 2 pushes broader language and cites what was already
/// removed; attempt 3 (or a fully exhausted plan) adds the final-fallback
/// instruction.
pub fn build_retry_prompt(
    params: &SearchActionParams,
    strategy: &RetryStrategy,
    already_removed: &[FilterKey],
) -> String {
    let mut prompt = format!(
        "The search for \"{}\" returned zero results. Emit a broadened search directive.\n",
        params.q
    );

    if strategy.retry_attempt <= 1 {
        if let Some(suggestion) = strategy.synonym_suggestions.first() {
            prompt.push_str(&format!(
                "Try alternative phrasings for \"{}\": {}.\n",
                suggestion.term,
                suggestion.synonyms.join(", ")
            ));
        }
        if let Some(filter) = strategy.filter_to_remove {
            prompt.push_str(&format!(
                "Drop the \"{}\" filter, which is the most restrictive one still applied.\n",
                filter.as_str()
            ));
        }
    } else {
        prompt.push_str("Use broader, more general search terms.\n");
        if !already_removed.is_empty() {
            let removed: Vec<&str> = already_removed.iter().map(|f| f.as_str()).collect();
            prompt.push_str(&format!(
                "Filters already removed without success: {}.\n",
                removed.join(", ")
            ));
        }
        if let Some(filter) = strategy.filter_to_remove {
            prompt.push_str(&format!("Also drop the \"{}\" filter.\n", filter.as_str()));
        }
    }

    let exhausted = !strategy.has_filters_to_remove && strategy.synonym_suggestions.is_empty();
    if strategy.retry_attempt >= MAX_RETRY_ATTEMPTS || exhausted {
        prompt.push_str(
            "If this attempt also finds nothing, tell the user no congressional records matched and suggest they try an external search.\n",
        );
    }

    prompt
}

/// Single-sentence, user-facing account of what the retry broadened. Shown
/// whenever results come from a materially different search than the user
/// asked for.
pub fn transparency_message(strategy: &RetryStrategy, original_query: &str) -> String {
    let mut changes = Vec::new();
    if let Some(simplified) = &strategy.simplified_query {
        changes.push(format!(
            "searching for \"{}\" instead of \"{}\"",
            simplified, original_query
        ));
    }
    if let Some(filter) = strategy.filter_to_remove {
        changes.push(format!("removing the {}", filter.display_name()));
    }

    if changes.is_empty() {
        format!(
            "I broadened the search for \"{}\" to find related records.",
            original_query
        )
    } else {
        format!("I'm {}.", changes.join(" and "))
    }
}

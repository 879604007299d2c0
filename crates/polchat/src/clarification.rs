//! Clarifying questions for ambiguous queries, and resolution of the
//! user's follow-up reply into a refined search query.
//!
//! One clarification episode: `generate` emits a question with selectable
//! options, the caller renders it, and the next user message comes back
//! through `is_response_to_question` / `refine`. The question is discarded
//! after resolution.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::ambiguity::{AmbiguityCategory, AmbiguityDetection};

/// Replies longer than this are treated as a fully specified replacement
/// query rather than a selection.
const REPLACEMENT_REPLY_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationOption {
    pub label: String,
    pub refined_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub question: String,
    /// 2-4 entries, ordered as presented to the user.
    pub options: Vec<ClarificationOption>,
    pub category: AmbiguityCategory,
}

/// Broad topic -> specific sub-topics. Each entry is (option label,
/// refined query). Questions offer the top 4.
static TOPIC_REFINEMENTS: LazyLock<Vec<(&'static str, Vec<(&'static str, &'static str)>)>> =
    LazyLock::new(|| {
        vec![
            (
                "taxes",
                vec![
                    ("Income taxes", "income taxes legislation"),
                    ("Corporate taxes", "corporate taxes legislation"),
                    ("Capital gains taxes", "capital gains taxes"),
                    ("Payroll taxes", "payroll taxes"),
                    ("Tax credits", "tax credits for families"),
                ],
            ),
            (
                "healthcare",
                vec![
                    ("Medicare and Medicaid", "medicare and medicaid funding"),
                    ("Prescription drug prices", "prescription drug prices"),
                    ("Health insurance coverage", "health insurance coverage"),
                    ("Rural hospitals", "rural hospital funding"),
                ],
            ),
            (
                "immigration",
                vec![
                    ("Border security", "border security funding"),
                    ("Pathways to citizenship", "pathways to citizenship"),
                    ("Asylum policy", "asylum policy"),
                    ("Work visas", "work visa programs"),
                ],
            ),
            (
                "climate",
                vec![
                    ("Clean energy incentives", "clean energy incentives"),
                    ("Emissions rules", "power plant emissions rules"),
                    ("Disaster relief", "climate disaster relief funding"),
                    ("Electric vehicles", "electric vehicle subsidies"),
                ],
            ),
            (
                "education",
                vec![
                    ("Student loans", "student loan relief"),
                    ("School funding", "public school funding"),
                    ("Teacher pay", "teacher pay legislation"),
                    ("School choice", "school choice programs"),
                ],
            ),
            (
                "guns",
                vec![
                    ("Background checks", "firearm background checks"),
                    ("Assault weapons", "assault weapons legislation"),
                    ("Red flag laws", "red flag laws"),
                    ("Concealed carry", "concealed carry laws"),
                ],
            ),
        ]
    });

/// Category priority when several matched: only one question is asked.
const CATEGORY_PRIORITY: [AmbiguityCategory; 5] = [
    AmbiguityCategory::VagueTopic,
    AmbiguityCategory::MissingReferent,
    AmbiguityCategory::ScopeUnclear,
    AmbiguityCategory::TimeAmbiguous,
    AmbiguityCategory::MultipleInterpretations,
];

pub(crate) fn topic_keys() -> Vec<&'static str> {
    TOPIC_REFINEMENTS.iter().map(|(key, _)| *key).collect()
}

/// Build a clarifying question for an ambiguous query, or `None` when the
/// detection found nothing to clarify.
pub fn generate(query: &str, detection: &AmbiguityDetection) -> Option<ClarificationQuestion> {
    if !detection.is_ambiguous || detection.categories.is_empty() {
        return None;
    }

    let category = CATEGORY_PRIORITY
        .iter()
        .copied()
        .find(|c| detection.categories.contains(c))?;

    let query = query.trim();
    let question = match category {
        AmbiguityCategory::VagueTopic => vague_topic_question(query),
        AmbiguityCategory::MissingReferent => missing_referent_question(query),
        AmbiguityCategory::ScopeUnclear => scope_question(query),
        AmbiguityCategory::TimeAmbiguous => time_question(query),
        AmbiguityCategory::MultipleInterpretations => generic_fallback(query, category),
    };
    Some(question)
}

fn vague_topic_question(query: &str) -> ClarificationQuestion {
    let query_lower = query.to_lowercase();
    for (topic, refinements) in TOPIC_REFINEMENTS.iter() {
        if query_lower.contains(topic) {
            let options = refinements
                .iter()
                .take(4)
                .map(|(label, refined)| ClarificationOption {
                    label: (*label).to_string(),
                    refined_query: (*refined).to_string(),
                })
                .collect();
            return ClarificationQuestion {
                question: format!(
                    "\"{}\" covers a lot of ground. Which area are you interested in?",
                    topic
                ),
                options,
                category: AmbiguityCategory::VagueTopic,
            };
        }
    }
    generic_fallback(query, AmbiguityCategory::VagueTopic)
}

fn generic_fallback(query: &str, category: AmbiguityCategory) -> ClarificationQuestion {
    ClarificationQuestion {
        question: format!("What would you like to know about \"{}\"?", query),
        options: vec![
            ClarificationOption {
                label: "Recent legislation".to_string(),
                refined_query: format!("recent legislation about {}", query),
            },
            ClarificationOption {
                label: "Legislator positions".to_string(),
                refined_query: format!("legislator positions on {}", query),
            },
            ClarificationOption {
                label: "Voting records".to_string(),
                refined_query: format!("voting records on {}", query),
            },
        ],
        category,
    }
}

fn missing_referent_question(query: &str) -> ClarificationQuestion {
    let query_lower = query.to_lowercase();
    let about_legislator = [
        "senator",
        "congressman",
        "congresswoman",
        "representative",
        "lawmaker",
        " he ",
        " she ",
        " they ",
    ]
    .iter()
    .any(|p| query_lower.contains(p));

    if about_legislator {
        ClarificationQuestion {
            question: "Which legislator are you asking about?".to_string(),
            options: vec![
                ClarificationOption {
                    label: "A senator".to_string(),
                    refined_query: format!("senators {}", query),
                },
                ClarificationOption {
                    label: "A House representative".to_string(),
                    refined_query: format!("house representatives {}", query),
                },
            ],
            category: AmbiguityCategory::MissingReferent,
        }
    } else {
        ClarificationQuestion {
            question: "Which bill or law do you mean?".to_string(),
            options: vec![
                ClarificationOption {
                    label: "A bill currently in Congress".to_string(),
                    refined_query: format!("current bills in congress {}", query),
                },
                ClarificationOption {
                    label: "A recently passed law".to_string(),
                    refined_query: format!("recently passed laws {}", query),
                },
                ClarificationOption {
                    label: "A bill in the news".to_string(),
                    refined_query: format!("major bills in the news {}", query),
                },
            ],
            category: AmbiguityCategory::MissingReferent,
        }
    }
}

fn scope_question(query: &str) -> ClarificationQuestion {
    ClarificationQuestion {
        question: "Whose positions are you interested in?".to_string(),
        options: vec![
            ClarificationOption {
                label: "Democrats".to_string(),
                refined_query: format!("{} democrats", query),
            },
            ClarificationOption {
                label: "Republicans".to_string(),
                refined_query: format!("{} republicans", query),
            },
            ClarificationOption {
                label: "Both parties".to_string(),
                refined_query: format!("{} both parties", query),
            },
            ClarificationOption {
                label: "Specific legislators".to_string(),
                refined_query: format!("{} by individual legislators", query),
            },
        ],
        category: AmbiguityCategory::ScopeUnclear,
    }
}

fn time_question(query: &str) -> ClarificationQuestion {
    ClarificationQuestion {
        question: "What time period should I cover?".to_string(),
        options: vec![
            ClarificationOption {
                label: "Last 6 months".to_string(),
                refined_query: format!("{} in the last 6 months", query),
            },
            ClarificationOption {
                label: "Current session".to_string(),
                refined_query: format!("{} in the current congressional session", query),
            },
            ClarificationOption {
                label: "Last 2 years".to_string(),
                refined_query: format!("{} in the last 2 years", query),
            },
            ClarificationOption {
                label: "All available records".to_string(),
                refined_query: format!("{} across all available records", query),
            },
        ],
        category: AmbiguityCategory::TimeAmbiguous,
    }
}

/// Whether a reply selects one of the offered options (by label, ordinal,
/// or an affirmative like "yes, that one").
pub fn is_response_to_question(reply: &str, question: &ClarificationQuestion) -> bool {
    match_option(reply, question).is_some()
}

/// Resolve a clarification reply into the query to search for.
pub fn refine(original_query: &str, reply: &str, question: &ClarificationQuestion) -> String {
    if let Some(idx) = match_option(reply, question) {
        return question.options[idx].refined_query.clone();
    }
    let reply = reply.trim();
    if reply.len() > REPLACEMENT_REPLY_LEN {
        // Long free-text reply: the user restated the whole question.
        return reply.to_string();
    }
    format!("{} {}", original_query.trim(), reply)
}

fn match_option(reply: &str, question: &ClarificationQuestion) -> Option<usize> {
    let reply_lower = reply.trim().to_lowercase();
    if reply_lower.is_empty() {
        return None;
    }

    // Label match in either direction ("income taxes" selects "Income taxes
    // legislation" style labels and vice versa).
    for (idx, option) in question.options.iter().enumerate() {
        let label = option.label.to_lowercase();
        if reply_lower.contains(&label) || (reply_lower.len() >= 3 && label.contains(&reply_lower)) {
            return Some(idx);
        }
    }

    // Ordinal selection.
    let ordinals: &[(&str, usize)] = &[
        ("first", 0),
        ("1", 0),
        ("one", 0),
        ("second", 1),
        ("2", 1),
        ("third", 2),
        ("3", 2),
        ("fourth", 3),
        ("4", 3),
    ];
    for (word, idx) in ordinals {
        let selected = reply_lower == *word || ordinal_phrase(&reply_lower, word);
        if selected && *idx < question.options.len() {
            return Some(*idx);
        }
    }
    if reply_lower.contains("last") && !question.options.is_empty() {
        return Some(question.options.len() - 1);
    }

    // Affirmative without a pointer selects the first option.
    let affirmatives = ["yes", "yeah", "yep", "sure", "that one", "that works"];
    if affirmatives.iter().any(|a| reply_lower.starts_with(a)) && !question.options.is_empty() {
        return Some(0);
    }

    None
}

/// "the 2" must not select inside "the 2017": the ordinal has to end at a
/// word boundary.
fn ordinal_phrase(reply: &str, word: &str) -> bool {
    for prefix in ["the ", "option ", "number "] {
        let needle = format!("{}{}", prefix, word);
        let mut from = 0;
        while let Some(pos) = reply[from..].find(&needle) {
            let end = from + pos + needle.len();
            if reply[end..].chars().next().map_or(true, |c| !c.is_alphanumeric()) {
                return true;
            }
            from = end;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambiguity::detect;

    fn taxes_question() -> ClarificationQuestion {
        let detection = detect("taxes", 0);
        generate("taxes", &detection).expect("taxes should yield a question")
    }

    #[test]
    fn unambiguous_detection_yields_no_question() {
        let detection = detect("What did Senator Warren say about S. 1234 in January 2024", 0);
        assert!(!detection.is_ambiguous);
        assert!(generate("whatever", &detection).is_none());
    }

    #[test]
    fn topic_table_entries_get_table_options() {
        for topic in topic_keys() {
            let detection = detect(topic, 0);
            let question = generate(topic, &detection).expect("topic should yield question");
            assert_eq!(question.category, AmbiguityCategory::VagueTopic);
            assert!(question.question.contains(topic));
            assert!((2..=4).contains(&question.options.len()));
            // Not the generic fallback.
            assert!(question.options.iter().all(|o| o.label != "Recent legislation"));
        }
    }

    #[test]
    fn taxes_scenario_end_to_end() {
        let question = taxes_question();
        assert!(question.question.contains("taxes"));
        assert!(question.options.len() <= 5);
        for option in &question.options {
            assert!(
                option.refined_query.contains("tax"),
                "refined query should stay on topic: {}",
                option.refined_query
            );
        }
    }

    #[test]
    fn refine_matches_option_label() {
        let question = taxes_question();
        let refined = refine("taxes", "income taxes", &question);
        assert_eq!(refined, question.options[0].refined_query);
    }

    #[test]
    fn refine_concatenates_short_unmatched_reply() {
        let question = taxes_question();
        let refined = refine("taxes", "sales tax", &question);
        assert!(refined.contains("taxes"));
        assert!(refined.contains("sales tax"));
    }

    #[test]
    fn refine_uses_long_reply_as_replacement() {
        let question = taxes_question();
        let reply = "how the 2017 tax cuts affected small businesses";
        assert_eq!(refine("taxes", reply, &question), reply);
    }

    #[test]
    fn ordinal_and_affirmative_selection() {
        let question = taxes_question();
        assert!(is_response_to_question("the first one", &question));
        assert!(is_response_to_question("yes, that one", &question));
        assert_eq!(
            refine("taxes", "the second one", &question),
            question.options[1].refined_query
        );
        assert_eq!(
            refine("taxes", "yes, that one", &question),
            question.options[0].refined_query
        );
    }

    #[test]
    fn digit_ordinal_needs_a_word_boundary() {
        let question = taxes_question();
        // "the 2017" is a year inside a replacement query, not option 2.
        let reply = "how the 2017 tax cuts affected small businesses";
        assert!(!is_response_to_question(reply, &question));
        assert_eq!(refine("taxes", reply, &question), reply);
        // A bare digit ordinal still selects.
        assert!(is_response_to_question("the 2", &question));
        assert_eq!(
            refine("taxes", "the 2", &question),
            question.options[1].refined_query
        );
    }

    #[test]
    fn unrelated_reply_is_not_a_selection() {
        let question = taxes_question();
        assert!(!is_response_to_question("actually, show me healthcare stuff instead", &question));
    }

    #[test]
    fn every_question_has_options() {
        let queries = [
            ("What does the bill say?", 0),
            ("what do lawmakers think about the bill recently", 0),
        ];
        for (query, turn) in queries {
            let detection = detect(query, turn);
            if let Some(question) = generate(query, &detection) {
                assert!(!question.options.is_empty());
                assert!(question.options.len() <= 4);
            }
        }
    }
}

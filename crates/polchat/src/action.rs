//! Search-action extraction and validation.
//!
//! The model is contracted to emit a fenced ```search block containing a
//! JSON directive when it wants data retrieved. This module finds that
//! block in a free-text reply, validates it, and splits the conversational
//! remainder out. Invalid params never reach the search backend.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Supported congress numbers (GovInfo-era transcript coverage).
pub const MIN_CONGRESS: i32 = 93;
pub const MAX_CONGRESS: i32 = 119;

const KNOWN_CONTENT_TYPES: [&str; 3] = ["hearing", "floor_speech", "vote"];

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}(-\d{2})?$").expect("date regex is valid"));

/// Parameters of one search directive. Mirrors the search backend's query
/// contract; validity is a pure function of the struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchActionParams {
    pub q: String,
    /// Comma-separated subset of hearing, floor_speech, vote.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chamber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congress: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_witnesses: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<i64>,
}

impl SearchActionParams {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }

    /// Check shape and value ranges, collecting every violation.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.q.trim().is_empty() {
            errors.push("q is required and must be non-empty".to_string());
        }

        if let Some(types) = &self.content_type {
            for t in types.split(',') {
                let t = t.trim();
                if !t.is_empty() && !KNOWN_CONTENT_TYPES.contains(&t) {
                    errors.push(format!(
                        "type '{}' is not one of hearing, floor_speech, vote",
                        t
                    ));
                }
            }
        }

        if let Some(chamber) = &self.chamber {
            if chamber != "house" && chamber != "senate" {
                errors.push(format!("chamber '{}' must be house or senate", chamber));
            }
        }

        if let Some(limit) = self.limit {
            if !(1..=100).contains(&limit) {
                errors.push(format!("limit {} must be between 1 and 100", limit));
            }
        }

        if let Some(offset) = self.offset {
            if offset < 0 {
                errors.push(format!("offset {} must be >= 0", offset));
            }
        }

        if let Some(congress) = self.congress {
            if !(MIN_CONGRESS..=MAX_CONGRESS).contains(&congress) {
                errors.push(format!(
                    "congress {} must be between {} and {}",
                    congress, MIN_CONGRESS, MAX_CONGRESS
                ));
            }
        }

        if let Some(context) = self.context {
            if !(1..=10).contains(&context) {
                errors.push(format!("context {} must be between 1 and 10", context));
            }
        }

        for (field, value) in [("from", &self.from), ("to", &self.to)] {
            if let Some(date) = value {
                if !is_valid_date(date) {
                    errors.push(format!(
                        "{} '{}' must be YYYY-MM or YYYY-MM-DD",
                        field, date
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_valid_date(value: &str) -> bool {
    if !DATE_RE.is_match(value) {
        return false;
    }
    // Calendar validity, not just shape.
    if value.len() == 7 {
        NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").is_ok()
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
    }
}

/// Outcome of scanning one model reply.
#[derive(Debug, Clone)]
pub struct ParsedReply {
    pub has_search_action: bool,
    pub action: Option<SearchActionParams>,
    /// The conversational remainder with the matched block stripped. For a
    /// reply with no directive at all, the whole trimmed reply.
    pub text_content: String,
    pub parse_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchDirective {
    action: String,
    params: serde_json::Value,
}

struct FencedBlock {
    tag: String,
    body: String,
    start: usize,
    end: usize,
}

fn extract_fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(open_rel) = text[cursor..].find("```") {
        let open = cursor + open_rel;
        let after_open = open + 3;
        let Some(close_rel) = text[after_open..].find("```") else {
            break;
        };
        let close = after_open + close_rel;
        let inner = &text[after_open..close];
        let (tag, body) = match inner.find('\n') {
            Some(nl) => (inner[..nl].trim().to_string(), inner[nl + 1..].to_string()),
            None => (String::new(), inner.to_string()),
        };
        blocks.push(FencedBlock {
            tag,
            body,
            start: open,
            end: close + 3,
        });
        cursor = close + 3;
    }
    blocks
}

fn strip_span(text: &str, start: usize, end: usize) -> String {
    format!("{}{}", &text[..start], &text[end..]).trim().to_string()
}

/// Scan a model reply for an embedded search directive.
///
/// Blocks fenced with the `search` tag are tried first; if none exist, any
/// fenced block is a candidate. The first block that decodes to
/// `{"action": "search", "params": {...}}` is validated. A decodable but
/// invalid directive stops the scan: the model's own error is surfaced
/// rather than masked by a later block.
pub fn parse(reply: &str) -> ParsedReply {
    let blocks = extract_fenced_blocks(reply);
    let tagged: Vec<&FencedBlock> = blocks.iter().filter(|b| b.tag == "search").collect();
    let candidates: Vec<&FencedBlock> = if tagged.is_empty() {
        blocks.iter().collect()
    } else {
        tagged
    };

    for block in candidates {
        let Ok(directive) = serde_json::from_str::<SearchDirective>(block.body.trim()) else {
            continue;
        };
        if directive.action != "search" || !directive.params.is_object() {
            continue;
        }

        let text_content = strip_span(reply, block.start, block.end);
        let params: SearchActionParams = match serde_json::from_value(directive.params) {
            Ok(params) => params,
            Err(e) => {
                return ParsedReply {
                    has_search_action: false,
                    action: None,
                    text_content,
                    parse_error: Some(format!("search params did not decode: {}", e)),
                };
            }
        };

        return match params.validate() {
            Ok(()) => ParsedReply {
                has_search_action: true,
                action: Some(params),
                text_content,
                parse_error: None,
            },
            Err(errors) => ParsedReply {
                has_search_action: false,
                action: None,
                text_content,
                parse_error: Some(errors.join("; ")),
            },
        };
    }

    // The common non-search turn: plain conversation, not a failure.
    ParsedReply {
        has_search_action: false,
        action: None,
        text_content: reply.trim().to_string(),
        parse_error: None,
    }
}

/// System contract describing the search directive format. Sent with every
/// search-eligible prompt.
pub const SEARCH_CONTRACT_INSTRUCTIONS: &str = r#"You are a research assistant over congressional records (hearings, floor speeches, votes).

When the user's request needs data, emit exactly one fenced code block tagged `search` containing a JSON directive, plus a short conversational sentence outside the block:

```search
{
  "action": "search",
  "params": {
    "q": "firearm background checks",
    "type": "hearing,floor_speech",
    "speaker": "Warren",
    "chamber": "senate",
    "from": "2023-01",
    "to": "2023-12",
    "limit": 20
  }
}
```

Rules:
- "q" is required and must be non-empty.
- "type" is a comma-separated subset of: hearing, floor_speech, vote.
- "chamber" is "house" or "senate".
- "congress" is a number between 93 and 119.
- "from"/"to" use YYYY-MM or YYYY-MM-DD.
- "limit" is 1-100, "offset" >= 0, "context" 1-10.
- Omit any filter you are not sure about; a broad search beats a wrong filter.

If the user is not asking for data, reply conversationally with no code block."#;

/// Re-send the formatting contract after a malformed directive, quoting the
/// parse error so the model can correct itself.
pub fn build_correction_prompt(previous_error: &str) -> String {
    format!(
        "Your previous search directive was invalid: {}.\n\nEmit a corrected directive in exactly this format:\n\n{}",
        previous_error, SEARCH_CONTRACT_INSTRUCTIONS
    )
}

/// Cheap sniff for whether a malformed reply was trying to search at all.
/// Decides whether a corrective retry is worth the round trip versus
/// treating the reply as conversational.
pub fn has_search_intent(text: &str) -> bool {
    let lower = text.to_lowercase();
    (lower.contains("\"action\"") && lower.contains("search"))
        || (lower.contains("\"params\"") && lower.contains('{'))
        || lower.contains("\"q\":")
}

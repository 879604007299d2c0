//! Per-speaker sentiment aggregation.
//!
//! Groups result segments by speaker, asks the model for one structured
//! judgment covering every requested speaker, and retries malformed output
//! with exponential backoff. A partial or guessed map is never returned:
//! exhausting the budget yields a clear failure instead.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::llm::LlmClient;
use crate::types::{normalize_speaker_key, ChatMessage, ResultSegment, SpeakerStatement};

/// Total attempts (first try included).
const MAX_ATTEMPTS: u32 = 3;
/// Backoff before the second attempt; doubles each attempt after that.
const INITIAL_BACKOFF_MS: u64 = 500;

/// Normalized speaker key -> sentiment score in [0, 100].
pub type SpeakerSentimentMap = HashMap<String, u8>;

/// Group all result segments by speaker, restricted to the requested ids.
/// Output order follows the requested id order; speakers with no matching
/// segments are omitted.
pub fn group_statements(speaker_ids: &[String], results: &[ResultSegment]) -> Vec<SpeakerStatement> {
    let mut grouped: Vec<SpeakerStatement> = Vec::new();
    for requested in speaker_ids {
        let key = normalize_speaker_key(requested);
        let mut statement: Option<SpeakerStatement> = None;
        for segment in results {
            let Some(name) = &segment.speaker_name else {
                continue;
            };
            if normalize_speaker_key(name) != key {
                continue;
            }
            let entry = statement.get_or_insert_with(|| SpeakerStatement {
                speaker_id: key.clone(),
                display_name: name.clone(),
                statements: Vec::new(),
            });
            entry.statements.push(segment.text.clone());
        }
        if let Some(statement) = statement {
            grouped.push(statement);
        }
    }
    grouped
}

#[derive(Debug, Deserialize)]
struct SentimentReply {
    sentiments: HashMap<String, i64>,
}

pub struct SentimentOrchestrator {
    llm: Arc<dyn LlmClient>,
}

impl SentimentOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Score each requested speaker's stance on `topic` from their grouped
    /// statements. Returns an empty map without any model call when none of
    /// the requested speakers appear in the results.
    pub async fn run(
        &self,
        topic: &str,
        speaker_ids: &[String],
        results: &[ResultSegment],
    ) -> Result<SpeakerSentimentMap> {
        let statements = group_statements(speaker_ids, results);
        if statements.is_empty() {
            return Ok(SpeakerSentimentMap::new());
        }

        let messages = build_messages(topic, &statements);
        let expected: Vec<&str> = statements.iter().map(|s| s.speaker_id.as_str()).collect();

        let mut last_error = EngineError::Parse("sentiment not attempted".to_string());
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 2);
                tracing::warn!(attempt, backoff_ms = backoff, error = %last_error, "sentiment attempt failed, backing off");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let reply = match self.llm.chat(&messages).await {
                Ok(reply) => reply,
                Err(e) if e.is_retryable() => {
                    // Transport failures ride the same backoff as bad output.
                    last_error = e;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match parse_sentiment_reply(&reply, &expected) {
                Ok(map) => return Ok(map),
                Err(e) => last_error = e,
            }
        }

        Err(EngineError::SentimentFailed(format!(
            "no usable judgment after {} attempts: {}",
            MAX_ATTEMPTS, last_error
        )))
    }
}

fn build_messages(topic: &str, statements: &[SpeakerStatement]) -> Vec<ChatMessage> {
    let mut body = String::new();
    for statement in statements {
        body.push_str(&format!(
            "Speaker \"{}\" ({}):\n",
            statement.speaker_id, statement.display_name
        ));
        for text in &statement.statements {
            body.push_str(&format!("- {}\n", text));
        }
        body.push('\n');
    }

    let system = "You score legislators' stances from their own recorded statements. \
Reply with only a JSON object of the form {\"sentiments\": {\"<speaker_id>\": <score>}} \
where each score is an integer from 0 (strongly opposed) to 100 (strongly supportive). \
Score every listed speaker exactly once.";

    let user = format!(
        "Topic: {}\n\nStatements from the congressional record:\n\n{}",
        topic, body
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

fn parse_sentiment_reply(reply: &str, expected: &[&str]) -> Result<SpeakerSentimentMap> {
    // Tolerate a fenced or prose-wrapped object; the JSON itself must parse.
    let start = reply
        .find('{')
        .ok_or_else(|| EngineError::Parse("no JSON object in sentiment reply".to_string()))?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| EngineError::Parse("unterminated JSON object in sentiment reply".to_string()))?;
    let parsed: SentimentReply = serde_json::from_str(&reply[start..=end])
        .map_err(|e| EngineError::Parse(format!("sentiment reply did not decode: {}", e)))?;

    let mut map = SpeakerSentimentMap::new();
    for speaker in expected {
        let key = normalize_speaker_key(speaker);
        let score = parsed
            .sentiments
            .iter()
            .find(|(k, _)| normalize_speaker_key(k) == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| {
                EngineError::Parse(format!("sentiment reply missing speaker '{}'", speaker))
            })?;
        if !(0..=100).contains(&score) {
            return Err(EngineError::Parse(format!(
                "score {} for '{}' outside 0-100",
                score, speaker
            )));
        }
        map.insert(key, score as u8);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedLlm {
        replies: Mutex<Vec<Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok("{\"sentiments\": {}}".to_string())
            } else {
                replies.remove(0)
            }
        }
    }

    fn segment(speaker: &str, text: &str) -> ResultSegment {
        ResultSegment {
            content_id: Uuid::new_v4(),
            segment_index: 0,
            text: text.to_string(),
            score: 0.8,
            content_type: "hearing".to_string(),
            speaker_name: Some(speaker.to_string()),
            title: None,
            date: None,
            chamber: None,
            committee: None,
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn grouping_restricts_to_requested_speakers() {
        let results = vec![
            segment("Elizabeth Warren", "First point."),
            segment("Ted Cruz", "Counterpoint."),
            segment("elizabeth warren", "Second point."),
        ];
        let grouped = group_statements(&ids(&["Elizabeth Warren"]), &results);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].speaker_id, "elizabeth warren");
        assert_eq!(grouped[0].statements.len(), 2);
    }

    #[tokio::test]
    async fn no_matching_speakers_means_no_model_call() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let orchestrator = SentimentOrchestrator::new(llm.clone());
        let results = vec![segment("Someone Else", "Text.")];
        let map = orchestrator
            .run("gun control", &ids(&["Warren", "Cruz", "Sanders"]), &results)
            .await
            .expect("empty map is not an error");
        assert!(map.is_empty());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn valid_reply_scores_every_speaker() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            "Here you go:\n{\"sentiments\": {\"elizabeth warren\": 88, \"ted cruz\": 15}}"
                .to_string(),
        )]));
        let orchestrator = SentimentOrchestrator::new(llm.clone());
        let results = vec![segment("Elizabeth Warren", "Pro."), segment("Ted Cruz", "Con.")];
        let map = orchestrator
            .run("gun control", &ids(&["Elizabeth Warren", "Ted Cruz"]), &results)
            .await
            .expect("scores");
        assert_eq!(map.get("elizabeth warren"), Some(&88));
        assert_eq!(map.get("ted cruz"), Some(&15));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_output_is_retried_with_backoff() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("not json at all".to_string()),
            Ok("{\"sentiments\": {\"elizabeth warren\": 250}}".to_string()),
            Ok("{\"sentiments\": {\"elizabeth warren\": 72}}".to_string()),
        ]));
        let orchestrator = SentimentOrchestrator::new(llm.clone());
        let results = vec![segment("Elizabeth Warren", "Statement.")];
        let map = orchestrator
            .run("housing", &ids(&["Elizabeth Warren"]), &results)
            .await
            .expect("third attempt succeeds");
        assert_eq!(map.get("elizabeth warren"), Some(&72));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_use_the_same_budget() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(EngineError::transport("connection reset")),
            Err(EngineError::transport_with_status("HTTP 502", 502)),
            Err(EngineError::transport("timed out")),
        ]));
        let orchestrator = SentimentOrchestrator::new(llm.clone());
        let results = vec![segment("Elizabeth Warren", "Statement.")];
        let err = orchestrator
            .run("housing", &ids(&["Elizabeth Warren"]), &results)
            .await
            .expect_err("budget exhausted");
        assert_eq!(err.code(), "sentiment_failed");
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn configuration_errors_are_not_retried() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(EngineError::Configuration(
            "no key".to_string(),
        ))]));
        let orchestrator = SentimentOrchestrator::new(llm.clone());
        let results = vec![segment("Elizabeth Warren", "Statement.")];
        let err = orchestrator
            .run("housing", &ids(&["Elizabeth Warren"]), &results)
            .await
            .expect_err("fails fast");
        assert_eq!(err.code(), "configuration_error");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_never_returns_a_partial_map() {
        // A reply that scores only one of two speakers must fail, not return
        // the half it got.
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("{\"sentiments\": {\"elizabeth warren\": 70}}".to_string()),
            Ok("{\"sentiments\": {\"elizabeth warren\": 70}}".to_string()),
            Ok("{\"sentiments\": {\"elizabeth warren\": 70}}".to_string()),
        ]));
        let orchestrator = SentimentOrchestrator::new(llm);
        let results = vec![segment("Elizabeth Warren", "Pro."), segment("Ted Cruz", "Con.")];
        let err = orchestrator
            .run("gun control", &ids(&["Elizabeth Warren", "Ted Cruz"]), &results)
            .await
            .expect_err("incomplete judgment is a failure");
        assert_eq!(err.code(), "sentiment_failed");
    }
}

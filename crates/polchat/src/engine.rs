//! Turn orchestration.
//!
//! One entry point, `Engine::process_turn`, drives a user message through
//! the full pipeline: pending-clarification resolution, ambiguity
//! detection, intent classification, model-mediated search extraction, and
//! the bounded zero-result broadening episode. All conversation state lives
//! in `ConversationState`, owned by the caller; the engine itself holds
//! only collaborators and is safe to share across sessions.

use std::sync::Arc;

use crate::action::{self, SearchActionParams, SEARCH_CONTRACT_INSTRUCTIONS};
use crate::ambiguity;
use crate::clarification::{self, ClarificationQuestion};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::intent::{IntentClassifier, IntentResult, QueryIntent};
use crate::llm::{HttpLlmClient, LlmClient};
use crate::retry::{self, FilterKey, MAX_RETRY_ATTEMPTS};
use crate::search::{SearchBackend, SearchClient};
use crate::types::{ChatMessage, ResultSegment, SearchResponse};

/// Per-session conversation state. The engine reads and mutates it each
/// turn; nothing here is shared between sessions.
#[derive(Default)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub current_results: Vec<ResultSegment>,
    pub last_search_query: Option<String>,
    pub pending_clarification: Option<ClarificationQuestion>,
    /// Query that prompted the pending clarifying question, kept separate
    /// from `last_search_query` because no search has run for it.
    pub pending_query: Option<String>,
    pub turn_index: usize,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything one turn produced for the caller to render.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Assistant text to show the user.
    pub reply: String,
    /// Set when this turn asks a clarifying question instead of searching.
    pub clarification: Option<ClarificationQuestion>,
    /// Absent on clarification turns, which bypass the classifier.
    pub intent: Option<IntentResult>,
    pub search_response: Option<SearchResponse>,
    /// Params of the search that actually produced the results, after any
    /// broadening.
    pub executed_params: Option<SearchActionParams>,
    /// One-sentence account of how a broadened retry changed the search.
    pub transparency: Option<String>,
    /// Broadened retries spent this turn (0 when the first search landed).
    pub retry_attempts: u32,
}

impl TurnOutcome {
    fn conversational(reply: String, intent: Option<IntentResult>) -> Self {
        Self {
            reply,
            clarification: None,
            intent,
            search_response: None,
            executed_params: None,
            transparency: None,
            retry_attempts: 0,
        }
    }
}

pub struct Engine {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchBackend>,
    classifier: IntentClassifier,
}

impl Engine {
    /// Build an engine with live HTTP collaborators from config.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().map_err(EngineError::Configuration)?;
        let llm = Arc::new(HttpLlmClient::new(config.llm)?);
        let search = Arc::new(SearchClient::new(config.search)?);
        Ok(Self {
            llm,
            search,
            classifier: IntentClassifier::new(config.intent),
        })
    }

    /// Build an engine from explicit collaborators. Test constructor, and
    /// the hook for callers that pool HTTP clients themselves.
    pub fn with_components(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchBackend>,
        classifier: IntentClassifier,
    ) -> Self {
        Self {
            llm,
            search,
            classifier,
        }
    }

    /// Drive one user message through the pipeline, mutating `state` with
    /// the message log, result set, and clarification bookkeeping.
    pub async fn process_turn(
        &self,
        state: &mut ConversationState,
        user_message: &str,
    ) -> Result<TurnOutcome> {
        let outcome = self.process_inner(state, user_message).await?;

        state.messages.push(ChatMessage::user(user_message));
        state.messages.push(ChatMessage::assistant(outcome.reply.clone()));
        state.turn_index += 1;
        Ok(outcome)
    }

    async fn process_inner(
        &self,
        state: &mut ConversationState,
        user_message: &str,
    ) -> Result<TurnOutcome> {
        // A pending clarifying question claims the next message if the
        // message answers it; otherwise the question is abandoned.
        if let Some(question) = state.pending_clarification.take() {
            let original = state
                .pending_query
                .take()
                .unwrap_or_else(|| user_message.to_string());
            if clarification::is_response_to_question(user_message, &question) {
                let refined = clarification::refine(&original, user_message, &question);
                tracing::debug!(%refined, "clarification resolved");
                return self
                    .run_search_episode(
                        state,
                        SearchActionParams::new(refined),
                        String::new(),
                        clarification_intent(),
                    )
                    .await;
            }
            tracing::debug!("pending clarification abandoned");
        }

        // Ambiguous fresh queries get one clarifying question before any
        // model or backend round trip.
        let detection = ambiguity::detect(user_message, state.turn_index);
        if detection.is_ambiguous {
            if let Some(question) = clarification::generate(user_message, &detection) {
                tracing::debug!(
                    confidence = detection.confidence,
                    patterns = ?detection.matched_patterns,
                    "asking clarifying question"
                );
                let reply = render_question(&question);
                state.pending_clarification = Some(question.clone());
                state.pending_query = Some(user_message.trim().to_string());
                return Ok(TurnOutcome {
                    clarification: Some(question),
                    ..TurnOutcome::conversational(reply, None)
                });
            }
        }

        let intent = self.classifier.classify(
            user_message,
            &state.messages,
            &state.current_results,
            state.last_search_query.as_deref(),
        );
        tracing::debug!(intent = ?intent.intent, confidence = intent.confidence, "turn classified");

        if !intent.should_trigger_search() {
            let reply = self.answer_follow_up(state, user_message).await?;
            return Ok(TurnOutcome::conversational(reply, Some(intent)));
        }

        // Model-mediated extraction: the contract plus history, then one
        // corrective retry if the model tried to search but botched the
        // directive format.
        let reply = self.chat_with_contract(state, user_message, None).await?;
        let mut parsed = action::parse(&reply);
        if parsed.parse_error.is_some() && action::has_search_intent(&reply) {
            let error = parsed.parse_error.clone().unwrap_or_default();
            tracing::warn!(%error, "malformed search directive, sending correction");
            let corrected = self
                .chat_with_contract(state, user_message, Some(&error))
                .await?;
            parsed = action::parse(&corrected);
        }

        let Some(params) = parsed.action else {
            // Conversational turn, or a directive the model could not fix.
            let reply = if let Some(error) = parsed.parse_error {
                tracing::warn!(%error, "search directive unusable after correction");
                format!(
                    "{}\n\nI couldn't put together a valid search for that; could you rephrase?",
                    parsed.text_content
                )
                .trim()
                .to_string()
            } else {
                parsed.text_content
            };
            return Ok(TurnOutcome::conversational(reply, Some(intent)));
        };

        self.run_search_episode(state, params, parsed.text_content, intent)
            .await
    }

    /// Execute a search and, on zero results, run the bounded broadening
    /// episode. Updates `state` with whatever results finally landed.
    async fn run_search_episode(
        &self,
        state: &mut ConversationState,
        params: SearchActionParams,
        lead_in: String,
        intent: IntentResult,
    ) -> Result<TurnOutcome> {
        let original_query = params.q.clone();
        let response = self.search.search(&params).await?;

        if !response.is_empty() {
            let reply = compose_results_reply(&lead_in, &response, None);
            apply_results(state, &response, &intent, &params.q);
            return Ok(TurnOutcome {
                reply,
                clarification: None,
                intent: Some(intent),
                search_response: Some(response),
                executed_params: Some(params),
                transparency: None,
                retry_attempts: 0,
            });
        }

        let mut current = params;
        let mut removed: Vec<FilterKey> = Vec::new();
        let mut synonyms_tried = false;
        let mut attempts_spent = 0;

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            let strategy = retry::plan(&current, attempt, &removed, synonyms_tried);
            let exhausted =
                !strategy.has_filters_to_remove && strategy.synonym_suggestions.is_empty();
            if exhausted {
                break;
            }
            tracing::info!(
                attempt,
                filter = ?strategy.filter_to_remove,
                simplified = ?strategy.simplified_query,
                "search returned nothing, broadening"
            );

            // Ask the model to broaden; fall back to applying the plan
            // mechanically when its directive is unusable.
            let prompt = retry::build_retry_prompt(&current, &strategy, &removed);
            let next = match self.chat_for_retry(state, &prompt).await {
                Some(model_params) => model_params,
                None => {
                    let mut next = current.clone();
                    if let Some(simplified) = &strategy.simplified_query {
                        next.q = simplified.clone();
                    }
                    if let Some(filter) = strategy.filter_to_remove {
                        next = retry::remove_filter(&next, filter);
                    }
                    next
                }
            };

            if strategy.simplified_query.is_some() || !strategy.synonym_suggestions.is_empty() {
                synonyms_tried = true;
            }
            if let Some(filter) = strategy.filter_to_remove {
                removed.push(filter);
            }

            attempts_spent = attempt;
            let response = self.search.search(&next).await?;
            if !response.is_empty() {
                let transparency = retry::transparency_message(&strategy, &original_query);
                let reply = compose_results_reply(&lead_in, &response, Some(&transparency));
                apply_results(state, &response, &intent, &next.q);
                return Ok(TurnOutcome {
                    reply,
                    clarification: None,
                    intent: Some(intent),
                    search_response: Some(response),
                    executed_params: Some(next),
                    transparency: Some(transparency),
                    retry_attempts: attempt,
                });
            }
            current = next;
        }

        let reply = format!(
            "I couldn't find any congressional records matching \"{}\", even after broadening the search. \
You could try different wording, or look beyond the congressional record with an external search.",
            original_query
        );
        Ok(TurnOutcome {
            reply,
            clarification: None,
            intent: Some(intent),
            search_response: None,
            executed_params: Some(current),
            transparency: None,
            retry_attempts: attempts_spent,
        })
    }

    /// Chat turn under the search contract. `correction` re-sends the
    /// contract with the previous directive's error quoted.
    async fn chat_with_contract(
        &self,
        state: &ConversationState,
        user_message: &str,
        correction: Option<&str>,
    ) -> Result<String> {
        let mut messages = vec![ChatMessage::system(SEARCH_CONTRACT_INSTRUCTIONS)];
        messages.extend(state.messages.iter().cloned());
        messages.push(ChatMessage::user(user_message));
        if let Some(error) = correction {
            messages.push(ChatMessage::system(action::build_correction_prompt(error)));
        }
        self.llm.chat(&messages).await
    }

    /// One broadening round trip. Returns the model's directive only when
    /// it parses and validates; anything else falls back to the mechanical
    /// plan.
    async fn chat_for_retry(
        &self,
        state: &ConversationState,
        retry_prompt: &str,
    ) -> Option<SearchActionParams> {
        let mut messages = vec![ChatMessage::system(SEARCH_CONTRACT_INSTRUCTIONS)];
        messages.extend(state.messages.iter().cloned());
        messages.push(ChatMessage::system(retry_prompt));
        match self.llm.chat(&messages).await {
            Ok(reply) => action::parse(&reply).action,
            Err(e) => {
                tracing::warn!(error = %e, "broadening round trip failed, applying plan directly");
                None
            }
        }
    }

    /// Answer a follow-up about the on-screen results without searching.
    async fn answer_follow_up(
        &self,
        state: &ConversationState,
        user_message: &str,
    ) -> Result<String> {
        let mut context = String::from(
            "Answer from the search results below. Do not invent records that are not listed.\n\n",
        );
        for (i, segment) in state.current_results.iter().enumerate() {
            context.push_str(&format!(
                "[{}] {} ({}): {}\n",
                i + 1,
                segment.speaker_name.as_deref().unwrap_or("Unattributed"),
                segment.content_type,
                segment.text
            ));
        }
        let mut messages = vec![ChatMessage::system(context)];
        messages.extend(state.messages.iter().cloned());
        messages.push(ChatMessage::user(user_message));
        self.llm.chat(&messages).await
    }
}

fn clarification_intent() -> IntentResult {
    IntentResult {
        intent: QueryIntent::Clarification,
        confidence: 1.0,
        refinement_type: None,
        filters: Default::default(),
        preserve_existing_results: false,
        merge_with_existing: false,
        reasoning: "Resolved a pending clarifying question".to_string(),
    }
}

fn render_question(question: &ClarificationQuestion) -> String {
    let mut text = question.question.clone();
    for (i, option) in question.options.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, option.label));
    }
    text
}

fn compose_results_reply(
    lead_in: &str,
    response: &SearchResponse,
    transparency: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    if let Some(note) = transparency {
        parts.push(note.to_string());
    }
    if !lead_in.trim().is_empty() {
        parts.push(lead_in.trim().to_string());
    }
    let more = if response.has_more {
        " There are more beyond these."
    } else {
        ""
    };
    parts.push(format!(
        "Found {} matching record{}.{}",
        response.total_returned,
        if response.total_returned == 1 { "" } else { "s" },
        more
    ));
    parts.join("\n\n")
}

/// Fold a successful response into the session per the intent's merge and
/// preserve semantics.
fn apply_results(
    state: &mut ConversationState,
    response: &SearchResponse,
    intent: &IntentResult,
    executed_query: &str,
) {
    if intent.merge_with_existing {
        for segment in &response.results {
            let dup = state
                .current_results
                .iter()
                .any(|r| r.content_id == segment.content_id && r.segment_index == segment.segment_index);
            if !dup {
                state.current_results.push(segment.clone());
            }
        }
    } else {
        state.current_results = response.results.clone();
    }
    state.last_search_query = Some(executed_query.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedLlm {
        replies: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(String::from).collect()),
                calls: AtomicUsize::new(0),
            })
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
                Ok("Understood.".to_string())
            } else {
                Ok(replies.remove(0))
            }
        }
    }

    struct ScriptedBackend {
        responses: Mutex<Vec<Result<SearchResponse>>>,
        seen_queries: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<SearchResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen_queries: Mutex::new(Vec::new()),
            })
        }

        fn queries(&self) -> Vec<String> {
            self.seen_queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(&self, params: &SearchActionParams) -> Result<SearchResponse> {
            self.seen_queries.lock().unwrap().push(params.q.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(empty_response(&params.q))
            } else {
                responses.remove(0)
            }
        }
    }

    fn empty_response(query: &str) -> SearchResponse {
        SearchResponse {
            query: query.to_string(),
            results: Vec::new(),
            total_returned: 0,
            has_more: false,
        }
    }

    fn response_with(query: &str, speakers: &[&str]) -> SearchResponse {
        let results = speakers
            .iter()
            .enumerate()
            .map(|(i, s)| ResultSegment {
                content_id: Uuid::new_v4(),
                segment_index: i as i32,
                text: format!("Statement {} on the record.", i),
                score: 0.9,
                content_type: "hearing".to_string(),
                speaker_name: Some((*s).to_string()),
                title: None,
                date: None,
                chamber: None,
                committee: None,
            })
            .collect::<Vec<_>>();
        SearchResponse {
            query: query.to_string(),
            total_returned: results.len(),
            results,
            has_more: false,
        }
    }

    fn engine(llm: Arc<ScriptedLlm>, backend: Arc<ScriptedBackend>) -> Engine {
        Engine::with_components(llm, backend, IntentClassifier::default())
    }

    const DIRECTIVE: &str = "Searching now.\n```search\n{\"action\": \"search\", \"params\": {\"q\": \"firearm background checks\"}}\n```";

    #[tokio::test]
    async fn search_turn_end_to_end() {
        let llm = ScriptedLlm::new(vec![DIRECTIVE]);
        let backend = ScriptedBackend::new(vec![Ok(response_with(
            "firearm background checks",
            &["Elizabeth Warren", "Ted Cruz"],
        ))]);
        let engine = engine(llm.clone(), backend.clone());
        let mut state = ConversationState::new();

        let outcome = engine
            .process_turn(&mut state, "What did senators say about firearm background checks in 2023?")
            .await
            .expect("turn succeeds");

        assert!(outcome.reply.contains("Searching now."));
        assert!(outcome.reply.contains("Found 2 matching records."));
        assert_eq!(outcome.retry_attempts, 0);
        assert!(outcome.transparency.is_none());
        assert_eq!(state.current_results.len(), 2);
        assert_eq!(
            state.last_search_query.as_deref(),
            Some("firearm background checks")
        );
        assert_eq!(backend.queries(), vec!["firearm background checks"]);
        // User turn plus assistant turn recorded.
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.turn_index, 1);
    }

    #[tokio::test]
    async fn ambiguous_query_gets_a_question_not_a_search() {
        let llm = ScriptedLlm::new(vec![]);
        let backend = ScriptedBackend::new(vec![]);
        let engine = engine(llm.clone(), backend.clone());
        let mut state = ConversationState::new();

        let outcome = engine
            .process_turn(&mut state, "taxes")
            .await
            .expect("turn succeeds");

        let question = outcome.clarification.expect("question asked");
        assert!(!question.options.is_empty());
        assert!(outcome.reply.contains("1."));
        assert!(state.pending_clarification.is_some());
        assert_eq!(state.pending_query.as_deref(), Some("taxes"));
        // No search ran, so no search query is on record.
        assert!(state.last_search_query.is_none());
        // No model call, no backend call.
        assert_eq!(llm.call_count(), 0);
        assert!(backend.queries().is_empty());
    }

    #[tokio::test]
    async fn clarification_reply_searches_the_refined_query() {
        let llm = ScriptedLlm::new(vec![]);
        let backend = ScriptedBackend::new(vec![Ok(response_with(
            "income taxes legislation",
            &["Ron Wyden"],
        ))]);
        let engine = engine(llm.clone(), backend.clone());
        let mut state = ConversationState::new();

        engine.process_turn(&mut state, "taxes").await.expect("question turn");
        let outcome = engine
            .process_turn(&mut state, "income taxes")
            .await
            .expect("resolution turn");

        assert_eq!(
            outcome.intent.as_ref().map(|i| i.intent),
            Some(QueryIntent::Clarification)
        );
        assert_eq!(backend.queries(), vec!["income taxes legislation"]);
        assert!(state.pending_clarification.is_none());
        // Refined query dispatched directly, no model round trip.
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn ignored_clarification_falls_through_to_normal_handling() {
        let llm = ScriptedLlm::new(vec![DIRECTIVE]);
        let backend = ScriptedBackend::new(vec![Ok(response_with(
            "firearm background checks",
            &["Elizabeth Warren"],
        ))]);
        let engine = engine(llm.clone(), backend.clone());
        let mut state = ConversationState::new();

        engine.process_turn(&mut state, "taxes").await.expect("question turn");
        let outcome = engine
            .process_turn(
                &mut state,
                "actually tell me what senators said about firearm background checks in 2023",
            )
            .await
            .expect("pivot turn");

        assert!(state.pending_clarification.is_none());
        assert!(state.pending_query.is_none());
        assert!(outcome.clarification.is_none());
        assert_eq!(backend.queries(), vec!["firearm background checks"]);
        // Only the search that actually ran is on record.
        assert_eq!(
            state.last_search_query.as_deref(),
            Some("firearm background checks")
        );
    }

    #[tokio::test]
    async fn follow_up_skips_the_search_backend() {
        let llm = ScriptedLlm::new(vec![DIRECTIVE, "Warren pressed for universal checks."]);
        let backend = ScriptedBackend::new(vec![Ok(response_with(
            "firearm background checks",
            &["Elizabeth Warren"],
        ))]);
        let engine = engine(llm.clone(), backend.clone());
        let mut state = ConversationState::new();

        engine
            .process_turn(&mut state, "What did senators say about firearm background checks in 2023?")
            .await
            .expect("search turn");
        let outcome = engine
            .process_turn(&mut state, "summarize these for me")
            .await
            .expect("follow-up turn");

        assert_eq!(
            outcome.intent.as_ref().map(|i| i.intent),
            Some(QueryIntent::FollowUp)
        );
        assert!(outcome.search_response.is_none());
        assert_eq!(outcome.reply, "Warren pressed for universal checks.");
        // Only the first turn hit the backend.
        assert_eq!(backend.queries().len(), 1);
        // Results stay on screen.
        assert_eq!(state.current_results.len(), 1);
    }

    #[tokio::test]
    async fn malformed_directive_gets_one_correction() {
        let bad = "I'll search.\n```search\n{\"action\": \"search\", \"params\": {\"q\": \"water rights\", \"limit\": 500}}\n```";
        let llm = ScriptedLlm::new(vec![bad, DIRECTIVE]);
        let backend = ScriptedBackend::new(vec![Ok(response_with(
            "firearm background checks",
            &["Elizabeth Warren"],
        ))]);
        let engine = engine(llm.clone(), backend.clone());
        let mut state = ConversationState::new();

        let outcome = engine
            .process_turn(&mut state, "find water rights records from the western states drought hearings")
            .await
            .expect("turn succeeds");

        assert_eq!(llm.call_count(), 2);
        assert!(outcome.search_response.is_some());
        assert_eq!(backend.queries().len(), 1);
    }

    #[tokio::test]
    async fn zero_results_trigger_broadened_retry_with_transparency() {
        let directive = "On it.\n```search\n{\"action\": \"search\", \"params\": {\"q\": \"gun control\", \"speaker\": \"Warren\", \"from\": \"2023-01\", \"to\": \"2023-12\"}}\n```";
        // Broadening round trip returns no usable directive, so the
        // mechanical plan applies.
        let llm = ScriptedLlm::new(vec![directive, "Let me broaden that."]);
        let backend = ScriptedBackend::new(vec![
            Ok(empty_response("gun control")),
            Ok(response_with("firearm regulation", &["Elizabeth Warren"])),
        ]);
        let engine = engine(llm.clone(), backend.clone());
        let mut state = ConversationState::new();

        let outcome = engine
            .process_turn(
                &mut state,
                "show me what Senator Warren said about gun control during 2023",
            )
            .await
            .expect("turn succeeds");

        assert_eq!(outcome.retry_attempts, 1);
        let transparency = outcome.transparency.expect("broadening disclosed");
        assert!(transparency.contains("firearm regulation"));
        assert!(outcome.reply.contains(&transparency));

        let queries = backend.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1], "firearm regulation");
        let executed = outcome.executed_params.expect("params recorded");
        // First synonym substituted, top-priority filter dropped.
        assert_eq!(executed.q, "firearm regulation");
        assert!(executed.from.is_none());
        assert!(executed.to.is_some());
        assert_eq!(executed.speaker.as_deref(), Some("Warren"));
    }

    #[tokio::test]
    async fn exhausted_retries_admit_defeat() {
        let directive = "On it.\n```search\n{\"action\": \"search\", \"params\": {\"q\": \"gun control\", \"speaker\": \"Warren\", \"from\": \"2023-01\", \"to\": \"2023-12\"}}\n```";
        let llm = ScriptedLlm::new(vec![directive]);
        // Every attempt comes back empty.
        let backend = ScriptedBackend::new(vec![]);
        let engine = engine(llm.clone(), backend.clone());
        let mut state = ConversationState::new();

        let outcome = engine
            .process_turn(
                &mut state,
                "show me what Senator Warren said about gun control during 2023",
            )
            .await
            .expect("turn succeeds");

        assert_eq!(outcome.retry_attempts, MAX_RETRY_ATTEMPTS);
        assert!(outcome.search_response.is_none());
        assert!(outcome.reply.contains("external search"));
        // Initial search plus three broadened attempts.
        assert_eq!(backend.queries().len(), 1 + MAX_RETRY_ATTEMPTS as usize);
        assert!(state.current_results.is_empty());
    }

    #[tokio::test]
    async fn backend_validation_errors_propagate() {
        let llm = ScriptedLlm::new(vec![DIRECTIVE]);
        let backend = ScriptedBackend::new(vec![Err(EngineError::Validation(
            "search backend rejected the request".to_string(),
        ))]);
        let engine = engine(llm, backend);
        let mut state = ConversationState::new();

        let err = engine
            .process_turn(&mut state, "find firearm background check hearings from last year")
            .await
            .expect_err("error surfaces");
        assert_eq!(err.code(), "validation_error");
    }
}

//! Multi-turn completion loop
//!
//! One run drives the model until it stops calling tools, a tool halts the
//! loop, or a ceiling is reached. Provider failures are recovered by
//! shortening history or backing off; the turn buffer is only persisted when
//! the run gets through.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::attention::effects;
use crate::bus::{ConversationId, ConversationKind, OutboundSink};
use crate::config::{CompletionConfig, PromptsConfig};
use crate::error::{MurmurError, ProviderError, Result};
use crate::history::{CompactionMode, HistoryStore, Message, ToolCall};
use crate::providers::{CompletionProvider, CompletionRequest, CompletionResponse, ToolDefinition, Usage};
use crate::state::StateStore;
use crate::tools::{ToolContext, ToolExecutionResult, ToolRegistry};

use super::response::ModelResponse;

/// Per-run inputs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub conversation_id: ConversationId,
    pub kind: ConversationKind,
    pub model: String,
    /// Shorten history once a call reports more total tokens than this.
    pub max_context_tokens: u32,
    pub instruction: String,
    /// Injected after history when the budget ran out.
    pub budget_note: Option<String>,
    pub now: DateTime<Utc>,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// The response carried no choices.
    NoChoices,
    Refused,
    /// The model answered without calling tools.
    Answered,
    /// A tool asked to end the loop.
    Halted,
    ToolLimit,
    IterationLimit,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stop: LoopStop,
    pub iterations: u32,
    pub tool_calls: u32,
    /// Usage of the final provider call.
    pub last_usage: Option<Usage>,
    /// Messages appended to history.
    pub persisted: usize,
}

pub struct CompletionLoop {
    provider: Arc<dyn CompletionProvider>,
    history: Arc<dyn HistoryStore>,
    states: Arc<dyn StateStore>,
    tools: Arc<ToolRegistry>,
    outbound: Arc<dyn OutboundSink>,
    config: CompletionConfig,
    prompts: PromptsConfig,
    ignoring_streak_limit: u32,
}

impl CompletionLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        history: Arc<dyn HistoryStore>,
        states: Arc<dyn StateStore>,
        tools: Arc<ToolRegistry>,
        outbound: Arc<dyn OutboundSink>,
        config: CompletionConfig,
        prompts: PromptsConfig,
        ignoring_streak_limit: u32,
    ) -> Self {
        Self {
            provider,
            history,
            states,
            tools,
            outbound,
            config,
            prompts,
            ignoring_streak_limit,
        }
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// Run the loop for one conversation.
    ///
    /// # Errors
    /// Returns the last provider error once every attempt of a call failed,
    /// or immediately on a non-retryable failure. Nothing is persisted then.
    pub async fn run(&self, ctx: &RunContext) -> Result<RunOutcome> {
        let id = &ctx.conversation_id;
        let definitions = self.tools.definitions_for(ctx.kind);
        let tool_ctx = ToolContext::new(id.clone(), ctx.kind).at(ctx.now);

        let mut history = self.history.fetch_messages(id).await?;
        let mut buffer: Vec<Message> = Vec::new();
        let mut iterations = 0u32;
        let mut tool_calls = 0u32;
        let mut last_usage = None;

        info!(conversation = %id, model = %ctx.model, "Starting completion loop");

        let stop = loop {
            if iterations >= self.config.max_iterations {
                info!(conversation = %id, iterations, "Iteration limit reached");
                break LoopStop::IterationLimit;
            }

            let response = self
                .call_with_recovery(ctx, &mut history, &buffer, &definitions)
                .await?;
            iterations += 1;

            if let Some(usage) = response.usage {
                last_usage = Some(usage);
                if usage.total_tokens > ctx.max_context_tokens {
                    info!(
                        conversation = %id,
                        total_tokens = usage.total_tokens,
                        max = ctx.max_context_tokens,
                        "Context above limit; shortening history"
                    );
                    self.shorten(id, CompactionMode::Shorten, &mut history).await;
                }
            }

            let Some(choice) = response.choices.into_iter().next() else {
                break LoopStop::NoChoices;
            };
            let message = choice.message;
            buffer.push(message.clone());

            if let Some(refusal) = message.refusal.as_deref() {
                self.handle_refusal(ctx, refusal).await;
                break LoopStop::Refused;
            }

            if !message.content.trim().is_empty() {
                self.handle_content(ctx, &message.content).await;
            }

            let calls = match message.tool_calls {
                Some(calls) if !calls.is_empty() => calls,
                _ => break LoopStop::Answered,
            };

            debug!(conversation = %id, count = calls.len(), "Executing tool calls");
            let mut halted = false;
            let mut limit_hit = false;
            for call in &calls {
                if limit_hit {
                    buffer.push(Message::tool_result(
                        &call.id,
                        &self.prompts.tool_skipped_result,
                    ));
                    continue;
                }

                let result = self.execute_tool(call, &tool_ctx).await;
                buffer.push(Message::tool_result(&call.id, &result.response_text));
                halted |= result.halts_loop;
                tool_calls += 1;

                if tool_calls >= self.config.max_tool_calls {
                    warn!(conversation = %id, last_call = %call.name, "Tool call limit reached");
                    limit_hit = true;
                }
            }

            if limit_hit {
                buffer.push(Message::system(&self.prompts.too_many_tools_note));
                break LoopStop::ToolLimit;
            }
            if halted {
                break LoopStop::Halted;
            }
        };

        let persisted = buffer.len();
        self.history.append_messages(id, buffer).await?;

        info!(
            conversation = %id,
            ?stop,
            iterations,
            tool_calls,
            persisted,
            "Completion loop finished"
        );

        Ok(RunOutcome {
            stop,
            iterations,
            tool_calls,
            last_usage,
            persisted,
        })
    }

    fn build_request(
        &self,
        ctx: &RunContext,
        history: &[Message],
        buffer: &[Message],
        definitions: &[ToolDefinition],
    ) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + buffer.len() + 2);
        messages.push(Message::system(&ctx.instruction));
        messages.extend_from_slice(history);
        if let Some(note) = &ctx.budget_note {
            messages.push(Message::system(note));
        }
        messages.extend_from_slice(buffer);

        CompletionRequest::new(&ctx.model, messages)
            .with_tools(definitions.to_vec())
            .with_response_schema(ModelResponse::schema())
    }

    /// Call the provider, recovering from failures up to `max_attempts` times.
    async fn call_with_recovery(
        &self,
        ctx: &RunContext,
        history: &mut Vec<Message>,
        buffer: &[Message],
        definitions: &[ToolDefinition],
    ) -> Result<CompletionResponse> {
        let id = &ctx.conversation_id;
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            let request = self.build_request(ctx, history, buffer, definitions);
            let err = match self.provider.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            match Recovery::for_error(&err) {
                Recovery::Shorten(mode) => {
                    warn!(conversation = %id, attempt, error = %err, ?mode, "Completion failed; shortening history");
                    self.shorten(id, mode, history).await;
                }
                Recovery::Backoff => {
                    warn!(conversation = %id, attempt, error = %err, "Completion failed; backing off");
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                Recovery::Abort => {
                    error!(conversation = %id, attempt, error = %err, "Completion failed; not retrying");
                    return Err(err);
                }
            }
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| {
            MurmurError::Config("completion.max_attempts must be at least 1".into())
        }))
    }

    /// Collapse stored history and refetch it. Failures are logged; the next
    /// attempt simply runs on the old history.
    async fn shorten(&self, id: &ConversationId, mode: CompactionMode, history: &mut Vec<Message>) {
        if let Err(e) = self.history.summarize_and_collapse(id, mode).await {
            warn!(conversation = %id, error = %e, "History shortening failed");
            return;
        }
        match self.history.fetch_messages(id).await {
            Ok(fresh) => *history = fresh,
            Err(e) => warn!(conversation = %id, error = %e, "History refetch failed"),
        }
    }

    async fn handle_refusal(&self, ctx: &RunContext, refusal: &str) {
        info!(conversation = %ctx.conversation_id, "Model refused");
        if let Err(e) = self.outbound.send_refusal(&ctx.conversation_id, refusal).await {
            warn!(conversation = %ctx.conversation_id, error = %e, "Failed to send refusal");
        }
        self.update_state(ctx, effects::reset_ignoring).await;
    }

    async fn handle_content(&self, ctx: &RunContext, content: &str) {
        let response = match ModelResponse::parse(content) {
            Ok(r) => r,
            Err(e) => {
                error!(conversation = %ctx.conversation_id, error = %e, "Model response failed validation");
                return;
            }
        };

        if !response.is_visible() {
            let limit = self.ignoring_streak_limit;
            self.update_state(ctx, |state| {
                effects::record_ignored(state, limit);
            })
            .await;
            return;
        }

        if let Err(e) = self
            .outbound
            .send_response(&ctx.conversation_id, response.texts(), response.sticker.clone())
            .await
        {
            warn!(conversation = %ctx.conversation_id, error = %e, "Failed to send response");
            return;
        }

        let now = ctx.now;
        self.update_state(ctx, |state| {
            effects::reset_streaks(state);
            effects::mark_engaged(state, now);
        })
        .await;
    }

    async fn update_state<F>(&self, ctx: &RunContext, apply: F)
    where
        F: FnOnce(&mut crate::state::ConversationState) + Send,
    {
        let result = async {
            let mut state = self.states.load_state(&ctx.conversation_id).await?;
            apply(&mut state);
            self.states.save_state(&state).await
        }
        .await;
        if let Err(e) = result {
            warn!(conversation = %ctx.conversation_id, error = %e, "Failed to update conversation state");
        }
    }

    /// Run one tool call. Faults become an apologetic result.
    async fn execute_tool(&self, call: &ToolCall, ctx: &ToolContext) -> ToolExecutionResult {
        let args = match serde_json::from_str::<serde_json::Value>(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Invalid JSON in tool arguments");
                json!({ "_parse_error": format!("Invalid arguments JSON: {}", e) })
            }
        };

        match self.tools.execute(&call.name, args, ctx).await {
            Ok(result) => result,
            Err(_) => ToolExecutionResult::text(self.prompts.tool_failed_result.clone()),
        }
    }
}

/// What to do after a failed completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Shorten(CompactionMode),
    Backoff,
    Abort,
}

impl Recovery {
    fn for_error(err: &MurmurError) -> Self {
        match err {
            MurmurError::ProviderTyped(ProviderError::RateLimit(_)) => {
                Recovery::Shorten(CompactionMode::Shorten)
            }
            MurmurError::ProviderTyped(p) if p.is_oversized_request() => {
                Recovery::Shorten(CompactionMode::ShortenWithoutMedia)
            }
            MurmurError::ProviderTyped(p) if p.is_retryable() => Recovery::Backoff,
            MurmurError::ProviderTyped(_) => Recovery::Abort,
            // Untyped transport failures are treated as transient.
            MurmurError::Http(_) | MurmurError::Provider(_) => Recovery::Backoff,
            _ => Recovery::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::OutboundKind;
    use crate::bus::OutboundMessage;
    use crate::history::{MemoryHistoryStore, NoopSummarizer};
    use crate::memory::KeywordMemory;
    use crate::state::MemoryStore;
    use crate::tools::builtin_tools;
    use crate::config::AttentionConfig;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ========================================================================
    // Test doubles
    // ========================================================================

    enum Step {
        Reply(CompletionResponse),
        Fail(fn() -> MurmurError),
    }

    struct ScriptedProvider {
        steps: Mutex<VecDeque<Step>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request);
            match self.steps.lock().unwrap().pop_front() {
                Some(Step::Reply(r)) => Ok(r),
                Some(Step::Fail(f)) => Err(f()),
                None => Ok(CompletionResponse::empty()),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// History store that counts shortenings.
    struct CountingHistory {
        inner: MemoryHistoryStore,
        shortenings: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for CountingHistory {
        async fn fetch_messages(&self, id: &ConversationId) -> Result<Vec<Message>> {
            self.inner.fetch_messages(id).await
        }

        async fn append_messages(&self, id: &ConversationId, messages: Vec<Message>) -> Result<()> {
            self.inner.append_messages(id, messages).await
        }

        async fn summarize_and_collapse(&self, id: &ConversationId, mode: CompactionMode) -> Result<()> {
            self.shortenings.fetch_add(1, Ordering::SeqCst);
            self.inner.summarize_and_collapse(id, mode).await
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl OutboundSink for RecordingSink {
        async fn send_response(
            &self,
            id: &ConversationId,
            texts: Vec<String>,
            sticker: Option<String>,
        ) -> Result<()> {
            self.sent.lock().unwrap().push(OutboundMessage {
                conversation_id: id.clone(),
                kind: OutboundKind::Response,
                texts,
                sticker,
            });
            Ok(())
        }

        async fn send_refusal(&self, id: &ConversationId, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(OutboundMessage::new(id, OutboundKind::Refusal, text));
            Ok(())
        }

        async fn send_busy(&self, id: &ConversationId, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(OutboundMessage::new(id, OutboundKind::Busy, text));
            Ok(())
        }
    }

    struct Harness {
        provider: Arc<ScriptedProvider>,
        history: Arc<CountingHistory>,
        states: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        completion: CompletionLoop,
    }

    fn harness(steps: Vec<Step>) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(steps));
        let history = Arc::new(CountingHistory {
            inner: MemoryHistoryStore::new(Arc::new(NoopSummarizer)),
            shortenings: AtomicUsize::new(0),
        });
        let states = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let tools = ToolRegistry::build(builtin_tools(
            states.clone(),
            Arc::new(KeywordMemory::new()),
            &AttentionConfig::default(),
            &PromptsConfig::default(),
        ))
        .unwrap();
        let completion = CompletionLoop::new(
            provider.clone(),
            history.clone(),
            states.clone(),
            Arc::new(tools),
            sink.clone(),
            CompletionConfig::default(),
            PromptsConfig::default(),
            10,
        );
        Harness {
            provider,
            history,
            states,
            sink,
            completion,
        }
    }

    fn ctx() -> RunContext {
        RunContext {
            conversation_id: "alice".into(),
            kind: ConversationKind::Private,
            model: "test-model".into(),
            max_context_tokens: 10_000,
            instruction: "be nice".into(),
            budget_note: None,
            now: Utc.with_ymd_and_hms(2026, 4, 4, 8, 0, 0).unwrap(),
        }
    }

    fn answer(text: &str) -> Step {
        Step::Reply(CompletionResponse::text(&format!(
            r#"{{"text": ["{}"], "sticker": null}}"#,
            text
        )))
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    // ========================================================================
    // Turn handling
    // ========================================================================

    #[tokio::test]
    async fn test_plain_answer_is_sent_and_persisted() {
        let h = harness(vec![answer("hi!")]);
        let outcome = h.completion.run(&ctx()).await.unwrap();

        assert_eq!(outcome.stop, LoopStop::Answered);
        assert_eq!(outcome.persisted, 1);
        let sent = h.sink.sent.lock().unwrap();
        assert_eq!(sent[0].texts, vec!["hi!"]);

        let state = h.states.load_state(&"alice".into()).await.unwrap();
        assert_eq!(state.last_engaged_at, Some(ctx().now));
    }

    #[tokio::test]
    async fn test_visible_answer_resets_both_streaks() {
        let h = harness(vec![answer("still here")]);
        let mut state = crate::state::ConversationState::new("alice".into());
        state.is_focused = true;
        state.listening_streak = 4;
        state.ignoring_streak = 2;
        h.states.save_state(&state).await.unwrap();

        h.completion.run(&ctx()).await.unwrap();

        let state = h.states.load_state(&"alice".into()).await.unwrap();
        assert_eq!(state.listening_streak, 0);
        assert_eq!(state.ignoring_streak, 0);
    }

    #[tokio::test]
    async fn test_request_carries_instruction_schema_and_note() {
        let h = harness(vec![answer("bye")]);
        let mut run = ctx();
        run.budget_note = Some("tired".into());
        h.completion.run(&run).await.unwrap();

        let requests = h.provider.requests.lock().unwrap();
        let messages = &requests[0].messages;
        assert_eq!(messages[0].content, "be nice");
        assert_eq!(messages.last().unwrap().content, "tired");
        assert!(requests[0].response_schema.is_some());
        assert!(requests[0].tools.iter().all(|t| t.name != "unfocus_chat"));
    }

    #[tokio::test]
    async fn test_empty_answer_counts_as_ignored() {
        let h = harness(vec![Step::Reply(CompletionResponse::text(
            r#"{"text": [], "sticker": null}"#,
        ))]);
        h.completion.run(&ctx()).await.unwrap();

        assert!(h.sink.sent.lock().unwrap().is_empty());
        let state = h.states.load_state(&"alice".into()).await.unwrap();
        assert_eq!(state.ignoring_streak, 1);
    }

    #[tokio::test]
    async fn test_invalid_answer_sends_nothing() {
        let h = harness(vec![Step::Reply(CompletionResponse::text("not json"))]);
        let outcome = h.completion.run(&ctx()).await.unwrap();

        assert_eq!(outcome.stop, LoopStop::Answered);
        assert!(h.sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refusal_stops_and_resets_ignoring() {
        let h = harness(vec![Step::Reply(CompletionResponse::refusal("no"))]);
        let mut state = crate::state::ConversationState::new("alice".into());
        state.ignoring_streak = 4;
        h.states.save_state(&state).await.unwrap();

        let outcome = h.completion.run(&ctx()).await.unwrap();
        assert_eq!(outcome.stop, LoopStop::Refused);
        assert_eq!(h.sink.sent.lock().unwrap()[0].kind, OutboundKind::Refusal);
        let state = h.states.load_state(&"alice".into()).await.unwrap();
        assert_eq!(state.ignoring_streak, 0);
    }

    #[tokio::test]
    async fn test_no_choices_stops() {
        let h = harness(vec![Step::Reply(CompletionResponse::empty())]);
        let outcome = h.completion.run(&ctx()).await.unwrap();
        assert_eq!(outcome.stop, LoopStop::NoChoices);
        assert_eq!(outcome.persisted, 0);
    }

    // ========================================================================
    // Tools
    // ========================================================================

    #[tokio::test]
    async fn test_tool_result_feeds_next_turn() {
        let h = harness(vec![
            Step::Reply(CompletionResponse::with_tools(
                "",
                vec![call("c1", "think", r#"{"thoughts": "hmm"}"#)],
            )),
            answer("done"),
        ]);
        let outcome = h.completion.run(&ctx()).await.unwrap();

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls, 1);
        let requests = h.provider.requests.lock().unwrap();
        let second = &requests[1].messages;
        let tool_msg = second.iter().find(|m| m.is_tool_result()).unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_msg.content, "hmm");
    }

    #[tokio::test]
    async fn test_halting_tool_finishes_turn_then_stops() {
        let h = harness(vec![Step::Reply(CompletionResponse::with_tools(
            "",
            vec![
                call("c1", "ignore_message", "{}"),
                call("c2", "think", r#"{"thoughts": "after"}"#),
            ],
        ))]);
        let outcome = h.completion.run(&ctx()).await.unwrap();

        assert_eq!(outcome.stop, LoopStop::Halted);
        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_tool_limit_skips_remaining_calls() {
        let calls: Vec<ToolCall> = (0..7)
            .map(|i| call(&format!("c{}", i), "think", r#"{"thoughts": "x"}"#))
            .collect();
        let h = harness(vec![Step::Reply(CompletionResponse::with_tools("", calls))]);
        let outcome = h.completion.run(&ctx()).await.unwrap();

        assert_eq!(outcome.stop, LoopStop::ToolLimit);
        assert_eq!(outcome.tool_calls, 5);

        let stored = h.history.fetch_messages(&"alice".into()).await.unwrap();
        let results: Vec<&Message> = stored.iter().filter(|m| m.is_tool_result()).collect();
        assert_eq!(results.len(), 7);
        assert_eq!(results[6].content, PromptsConfig::default().tool_skipped_result);
        assert_eq!(
            stored.last().unwrap().content,
            PromptsConfig::default().too_many_tools_note
        );
    }

    #[tokio::test]
    async fn test_tool_fault_becomes_apology() {
        let h = harness(vec![
            Step::Reply(CompletionResponse::with_tools(
                "",
                vec![call("c1", "think", "{broken")],
            )),
            answer("ok"),
        ]);
        h.completion.run(&ctx()).await.unwrap();

        let stored = h.history.fetch_messages(&"alice".into()).await.unwrap();
        let result = stored.iter().find(|m| m.is_tool_result()).unwrap();
        assert_eq!(result.content, PromptsConfig::default().tool_failed_result);
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let steps = (0..12)
            .map(|i| {
                Step::Reply(CompletionResponse::with_tools(
                    "",
                    vec![call(&format!("c{}", i), "fetch_info", r#"{"query": "q"}"#)],
                ))
            })
            .collect();
        let mut h = harness(steps);
        h.completion.config.max_tool_calls = 100;
        let outcome = h.completion.run(&ctx()).await.unwrap();

        assert_eq!(outcome.stop, LoopStop::IterationLimit);
        assert_eq!(outcome.iterations, 10);
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    fn rate_limited() -> MurmurError {
        ProviderError::RateLimit("slow down".into()).into()
    }

    fn too_large() -> MurmurError {
        ProviderError::ContextTooLarge("too long".into()).into()
    }

    fn unauthorized() -> MurmurError {
        ProviderError::Auth("bad key".into()).into()
    }

    fn overloaded() -> MurmurError {
        ProviderError::Overloaded("busy".into()).into()
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_exhausts_attempts_without_persisting() {
        let h = harness(vec![
            Step::Fail(rate_limited),
            Step::Fail(rate_limited),
            Step::Fail(rate_limited),
        ]);
        let err = h.completion.run(&ctx()).await.unwrap_err();

        assert!(matches!(
            err.as_provider(),
            Some(ProviderError::RateLimit(_))
        ));
        assert_eq!(h.provider.calls(), 3);
        assert_eq!(h.history.shortenings.load(Ordering::SeqCst), 3);
        assert!(h
            .history
            .fetch_messages(&"alice".into())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_oversized_request_recovers() {
        let h = harness(vec![Step::Fail(too_large), answer("fine")]);
        let outcome = h.completion.run(&ctx()).await.unwrap();

        assert_eq!(outcome.stop, LoopStop::Answered);
        assert_eq!(h.history.shortenings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_backs_off() {
        let h = harness(vec![Step::Fail(overloaded), answer("back")]);
        let started = tokio::time::Instant::now();
        h.completion.run(&ctx()).await.unwrap();

        assert!(started.elapsed() >= CompletionConfig::default().retry_backoff());
        assert_eq!(h.history.shortenings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_aborts_immediately() {
        let h = harness(vec![Step::Fail(unauthorized), answer("never")]);
        let err = h.completion.run(&ctx()).await.unwrap_err();

        assert!(matches!(err.as_provider(), Some(ProviderError::Auth(_))));
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_large_usage_triggers_proactive_shortening() {
        let h = harness(vec![Step::Reply(
            CompletionResponse::text(r#"{"text": ["long"], "sticker": null}"#)
                .with_usage(Usage::new(20_000, 10)),
        )]);
        let outcome = h.completion.run(&ctx()).await.unwrap();

        assert_eq!(h.history.shortenings.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.last_usage.unwrap().prompt_tokens, 20_000);
    }
}

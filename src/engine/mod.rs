// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The tool-calling loop
//!
//! [`ToolCallingLoop`] drives one turn: build the prompt, fetch a model
//! response, execute the tool calls it requested, and go around again until
//! the model answers without tools, something terminal happens, or the round
//! limit intervenes. Rounds accumulate in order; every prompt build sees all
//! prior rounds and their resolved tool results. The loop owns no rendering
//! and no persistence; it streams parts into the caller's sink and returns
//! a [`LoopResult`] for the request handler to act on.

pub mod confirm;
pub mod pause;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::classify::{classify, CancelOrigin, Classification, ClassifyOptions};
use crate::config::{LimitBehavior, LoopConfig};
use crate::engine::confirm::{ConfirmationGate, ConfirmationOutcome, ConfirmationRequest};
use crate::engine::pause::{CancellationSignal, GateOutcome, PauseController};
use crate::error::{LoopError, Result};
use crate::fetch::{FetchRequest, FetchResult, ResponseDelta, Transport};
use crate::prompt::{PromptBuildResult, PromptBuilder, PromptContext, PromptMessage};
use crate::stream::{OutputPart, OutputSink};
use crate::telemetry::{NoopTelemetry, TelemetryEvent, TelemetrySink};
use crate::tools::{NoGrouping, ToolCallError, ToolDescriptor, ToolExecutor, ToolGrouping};
use crate::turn::round::{ToolCallResults, ToolCallRound, ToolResult};
use crate::turn::{keys, TurnMetadata};

/// Scale the sampling temperature by the request-level retry counter,
/// clamped to the ceiling.
pub fn temperature_for_attempt(base: f32, attempt: u32, ceiling: f32) -> f32 {
    (base * (attempt + 1) as f32).min(ceiling)
}

/// How one completed round leaves the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// Tool calls resolved; the loop goes around again
    Continue,
    /// The model answered without tool calls
    Terminal,
    /// The round allowance is exhausted
    LimitReached,
}

/// A completed round as seen by a [`LoopObserver`].
pub struct RoundSnapshot<'a> {
    /// The round that just completed
    pub round: &'a ToolCallRound,
    /// Rounds completed so far, this one included
    pub rounds_completed: usize,
    /// Every tool result resolved so far
    pub results: &'a ToolCallResults,
    /// Where the loop goes from here
    pub outcome: InteractionOutcome,
}

/// Hook points for hosts that watch loop progress.
pub trait LoopObserver: Send {
    /// Called after each prompt build, before the fetch
    fn on_prompt_built(&mut self, _build: &PromptBuildResult) {}

    /// Called with each terminal fetch result, before classification
    fn on_response_received(&mut self, _result: &FetchResult) {}

    /// Called after each round completes, tool results included
    fn on_round_complete(&mut self, _snapshot: &RoundSnapshot<'_>) {}
}

/// Observer that ignores every hook.
#[derive(Debug, Default)]
pub struct NoopLoopObserver;

impl LoopObserver for NoopLoopObserver {}

/// One request into the loop, with the context it runs against.
#[derive(Debug, Clone, Default)]
pub struct LoopInvocation {
    /// The user's request text
    pub request: String,
    /// Conversation history preceding this turn
    pub history: Vec<PromptMessage>,
    /// Extra variables forwarded to the prompt builder
    pub variables: BTreeMap<String, String>,
}

impl LoopInvocation {
    /// Create an invocation for a request with no history
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Default::default()
        }
    }

    /// Set the conversation history
    pub fn with_history(mut self, history: Vec<PromptMessage>) -> Self {
        self.history = history;
        self
    }

    /// Add a contextual variable
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Everything the loop produced for one turn.
#[derive(Debug)]
pub struct LoopResult {
    /// The fetch result the loop ended on
    pub fetch_result: FetchResult,
    /// Completed rounds, in order
    pub rounds: Vec<ToolCallRound>,
    /// Resolved tool results for the whole turn
    pub tool_results: ToolCallResults,
    /// Whether any prompt references were suppressed by access policy
    pub references_suppressed: bool,
    /// Classification of the final fetch result
    pub classification: Classification,
    /// Loop-level metadata (round limit markers)
    pub metadata: TurnMetadata,
}

impl LoopResult {
    /// The last completed round, if any
    pub fn last_round(&self) -> Option<&ToolCallRound> {
        self.rounds.last()
    }

    /// The assistant text accumulated across rounds
    pub fn response_text(&self) -> String {
        self.rounds
            .iter()
            .map(|round| round.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Drives the request/response/tool cycle for one turn.
pub struct ToolCallingLoop {
    transport: Arc<dyn Transport>,
    executor: Arc<dyn ToolExecutor>,
    prompt_builder: Arc<dyn PromptBuilder>,
    confirmation_gate: Option<Arc<dyn ConfirmationGate>>,
    telemetry: Arc<dyn TelemetrySink>,
    config: LoopConfig,
    available_tools: Vec<ToolDescriptor>,
    grouping: Box<dyn ToolGrouping>,
    observer: Box<dyn LoopObserver>,
    pause: PauseController,
    cancel: CancellationSignal,

    rounds: Vec<ToolCallRound>,
    tool_results: ToolCallResults,
    references_suppressed: bool,
    round_allowance: u32,
    cancel_origin: CancelOrigin,
}

impl ToolCallingLoop {
    /// Create a loop over the given collaborators. Pause and cancellation
    /// default to inert signals; telemetry defaults to a no-op sink.
    pub fn new(
        transport: Arc<dyn Transport>,
        executor: Arc<dyn ToolExecutor>,
        prompt_builder: Arc<dyn PromptBuilder>,
        config: LoopConfig,
    ) -> Self {
        let round_allowance = config.max_tool_call_rounds;
        Self {
            transport,
            executor,
            prompt_builder,
            confirmation_gate: None,
            telemetry: Arc::new(NoopTelemetry),
            config,
            available_tools: Vec::new(),
            grouping: Box::new(NoGrouping),
            observer: Box::new(NoopLoopObserver),
            pause: PauseController::unpaused(),
            cancel: CancellationSignal::never(),
            rounds: Vec::new(),
            tool_results: ToolCallResults::new(),
            references_suppressed: false,
            round_allowance,
            cancel_origin: CancelOrigin::User,
        }
    }

    /// Set the tools visible to the model
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.available_tools = tools;
        self.grouping.invalidate();
        self
    }

    /// Set the tool-grouping strategy
    pub fn with_grouping(mut self, grouping: Box<dyn ToolGrouping>) -> Self {
        self.grouping = grouping;
        self
    }

    /// Set the confirmation gate. Required when the limit behavior is
    /// [`LimitBehavior::Confirm`].
    pub fn with_confirmation_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.confirmation_gate = Some(gate);
        self
    }

    /// Set the telemetry sink
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Set the progress observer
    pub fn with_observer(mut self, observer: Box<dyn LoopObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set the pause controller
    pub fn with_pause(mut self, pause: PauseController) -> Self {
        self.pause = pause;
        self
    }

    /// Set the cancellation signal
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    fn synthetic_cancel(&self) -> FetchResult {
        let request_id = self
            .rounds
            .last()
            .map(|round| round.request_id.clone())
            .unwrap_or_else(|| "local".to_string());
        FetchResult::Canceled { request_id }
    }

    async fn build_prompt(
        &mut self,
        invocation: &LoopInvocation,
        stream: &mut dyn OutputSink,
    ) -> Result<PromptBuildResult> {
        let build = {
            let context = PromptContext {
                request: &invocation.request,
                history: &invocation.history,
                rounds: &self.rounds,
                tool_results: &self.tool_results,
                variables: &invocation.variables,
            };
            self.prompt_builder.build(&context).await?
        };

        if !build.omitted_references.is_empty() {
            self.references_suppressed = true;
            tracing::debug!(
                target: "turnloop.engine",
                omitted = build.omitted_references.len(),
                "prompt references suppressed by access policy"
            );
        }
        // Surface references only once, on the first build.
        if self.rounds.is_empty() {
            for reference in &build.references {
                stream.push(OutputPart::Reference {
                    uri: reference.uri.clone(),
                });
            }
        }

        self.observer.on_prompt_built(&build);
        Ok(build)
    }

    async fn execute_tool_calls(&mut self, round: &ToolCallRound) -> bool {
        let futures = round
            .tool_calls
            .iter()
            .map(|call| self.executor.run(call));
        let outcomes = join_all(futures).await;

        let mut tool_cancelled = false;
        for (call, outcome) in round.tool_calls.iter().zip(outcomes) {
            let result = match outcome {
                Ok(result) => result,
                Err(ToolCallError::Cancelled) => {
                    tracing::info!(
                        target: "turnloop.engine",
                        call_id = %call.id,
                        tool = %call.name,
                        "tool call aborted the turn"
                    );
                    tool_cancelled = true;
                    ToolResult::error(&call.id, "cancelled")
                }
                Err(ToolCallError::Failed(message)) => ToolResult::error(&call.id, message),
            };
            if !self.tool_results.insert(result) {
                tracing::warn!(
                    target: "turnloop.engine",
                    call_id = %call.id,
                    "duplicate tool call id; keeping the first result"
                );
            }
        }
        tool_cancelled
    }

    async fn confirm_continuation(&mut self, stream: &mut dyn OutputSink) -> Result<bool> {
        let gate = self
            .confirmation_gate
            .as_ref()
            .ok_or_else(|| {
                LoopError::Confirmation("limit behavior is confirm but no gate is set".to_string())
            })?
            .clone();

        let request = ConfirmationRequest {
            title: "Continue iterating?".to_string(),
            message: format!(
                "{} tool-call rounds have run. Continue?",
                self.rounds.len()
            ),
            accepted: serde_json::json!({"choice": "continue"}),
            rejected: serde_json::json!({"choice": "stop"}),
        };
        stream.push(OutputPart::Confirmation {
            title: request.title.clone(),
            message: request.message.clone(),
            accepted: request.accepted.clone(),
            rejected: request.rejected.clone(),
        });

        match gate.resolve(&request).await? {
            ConfirmationOutcome::Accepted => {
                self.round_allowance += self.config.max_tool_call_rounds;
                tracing::info!(
                    target: "turnloop.engine",
                    allowance = self.round_allowance,
                    "continuation accepted; round allowance extended"
                );
                Ok(true)
            }
            ConfirmationOutcome::Rejected => Ok(false),
        }
    }

    /// Run the loop to completion for one invocation.
    pub async fn run(
        &mut self,
        invocation: &LoopInvocation,
        stream: &mut dyn OutputSink,
    ) -> Result<LoopResult> {
        self.config.validate()?;
        if self.config.limit_behavior == LimitBehavior::Confirm
            && self.confirmation_gate.is_none()
        {
            return Err(LoopError::Config(
                "limit behavior is confirm but no confirmation gate is set".to_string(),
            ));
        }

        let mut metadata = TurnMetadata::new();

        let final_result = loop {
            if self.pause.wait_until_active(&self.cancel).await == GateOutcome::Cancelled {
                break self.synthetic_cancel();
            }

            let build = self.build_prompt(invocation, stream).await?;

            if self.cancel.is_cancelled() {
                break self.synthetic_cancel();
            }

            let visible_tools = self.grouping.compute(&self.available_tools);
            let remaining = self.round_allowance.saturating_sub(self.rounds.len() as u32);
            let request = FetchRequest {
                model: self.config.model.clone(),
                messages: build.messages,
                tools: visible_tools,
                temperature: temperature_for_attempt(
                    self.config.base_temperature,
                    self.config.request_attempt,
                    self.config.temperature_ceiling,
                ),
                max_tokens: self.config.max_response_tokens,
                tool_call_limit: remaining,
            };

            let mut delta_count = 0usize;
            let mut delta_chars = 0usize;
            let result = {
                let transport = Arc::clone(&self.transport);
                let mut on_delta = |delta: ResponseDelta| match delta {
                    ResponseDelta::Text(text) => {
                        delta_count += 1;
                        delta_chars += text.len();
                        stream.push(OutputPart::text(text));
                    }
                    ResponseDelta::ToolCall(call) => {
                        delta_count += 1;
                        stream.push(OutputPart::progress(format!("Running {}", call.name)));
                    }
                };
                transport.request(request, &mut on_delta, &self.cancel).await
            };

            self.observer.on_response_received(&result);
            self.telemetry.record(TelemetryEvent::StreamSampled {
                request_id: Some(result.request_id().to_string()),
                parts: delta_count,
                chars: delta_chars,
            });

            // Non-success results end the turn without producing a round.
            if !result.is_success() {
                break result;
            }

            let round = ToolCallRound::new(
                result.text().to_string(),
                result.tool_calls().to_vec(),
                result.kind(),
                result.request_id().to_string(),
            );

            let tool_cancelled = if round.has_tool_calls() {
                self.execute_tool_calls(&round).await
            } else {
                false
            };

            let had_tool_calls = round.has_tool_calls();
            tracing::debug!(
                target: "turnloop.engine",
                round = self.rounds.len() + 1,
                request_id = %round.request_id,
                deltas = delta_count,
                tool_calls = round.tool_calls.len(),
                "round completed"
            );
            self.rounds.push(round);

            if tool_cancelled {
                self.cancel_origin = CancelOrigin::Tool;
                let outcome = self.synthetic_cancel();
                self.notify_round(InteractionOutcome::Terminal);
                break outcome;
            }

            if !had_tool_calls {
                self.notify_round(InteractionOutcome::Terminal);
                break result;
            }

            if self.rounds.len() as u32 >= self.round_allowance {
                self.notify_round(InteractionOutcome::LimitReached);
                match self.config.limit_behavior {
                    LimitBehavior::Stop => {
                        metadata.insert(keys::MAX_TOOL_CALLS_EXCEEDED, true);
                        tracing::info!(
                            target: "turnloop.engine",
                            rounds = self.rounds.len(),
                            "round limit reached; stopping"
                        );
                        break result;
                    }
                    LimitBehavior::Confirm => {
                        if !self.confirm_continuation(stream).await? {
                            metadata.insert(keys::MAX_TOOL_CALLS_EXCEEDED, true);
                            break result;
                        }
                    }
                }
            } else {
                self.notify_round(InteractionOutcome::Continue);
            }
        };

        let options = ClassifyOptions::from_config(&self.config)
            .with_cancel_origin(self.cancel_origin);
        let classification = classify(&final_result, &options)?;

        Ok(LoopResult {
            fetch_result: final_result,
            rounds: std::mem::take(&mut self.rounds),
            tool_results: std::mem::take(&mut self.tool_results),
            references_suppressed: self.references_suppressed,
            classification,
            metadata,
        })
    }

    fn notify_round(&mut self, outcome: InteractionOutcome) {
        let Some(round) = self.rounds.last() else {
            return;
        };
        let snapshot = RoundSnapshot {
            round,
            rounds_completed: self.rounds.len(),
            results: &self.tool_results,
            outcome,
        };
        self.observer.on_round_complete(&snapshot);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Request handler
//!
//! The outermost surface of a turn. The handler wires the tool-calling loop
//! to the stream pipeline, records the turn outcome exactly once, emits the
//! terminal telemetry event, and always returns a [`ChatResult`]. Loop
//! errors are caught here and reported as failed turns, never panics.

use std::sync::Arc;

use crate::config::LoopConfig;
use crate::engine::confirm::ConfirmationGate;
use crate::engine::pause::{CancellationSignal, PauseController};
use crate::engine::{LoopInvocation, LoopResult, ToolCallingLoop};
use crate::error::{ErrorDetail, ErrorKind, LoopError};
use crate::fetch::Transport;
use crate::prompt::PromptBuilder;
use crate::stream::pipeline::ResponsePipeline;
use crate::stream::{OutputPart, OutputSink};
use crate::telemetry::{NoopTelemetry, TelemetryEvent, TelemetrySink};
use crate::tools::{ToolDescriptor, ToolExecutor};
use crate::turn::{keys, Turn, TurnMetadata, TurnStatus};

/// The terminal result of one handled turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResult {
    /// Id of the handled turn
    pub turn_id: uuid::Uuid,
    /// Terminal status
    pub status: TurnStatus,
    /// Structured failure detail, when one exists
    pub error_detail: Option<ErrorDetail>,
    /// Final response content, when one exists
    pub response: Option<String>,
    /// Turn metadata after all collaborators have written to it
    pub metadata: TurnMetadata,
}

/// Handles one user request end to end.
pub struct RequestHandler {
    transport: Arc<dyn Transport>,
    executor: Arc<dyn ToolExecutor>,
    prompt_builder: Arc<dyn PromptBuilder>,
    confirmation_gate: Option<Arc<dyn ConfirmationGate>>,
    telemetry: Arc<dyn TelemetrySink>,
    config: LoopConfig,
    tools: Vec<ToolDescriptor>,
}

impl RequestHandler {
    /// Create a handler over the given collaborators
    pub fn new(
        transport: Arc<dyn Transport>,
        executor: Arc<dyn ToolExecutor>,
        prompt_builder: Arc<dyn PromptBuilder>,
        config: LoopConfig,
    ) -> Self {
        Self {
            transport,
            executor,
            prompt_builder,
            confirmation_gate: None,
            telemetry: Arc::new(NoopTelemetry),
            config,
            tools: Vec::new(),
        }
    }

    /// Set the tools visible to the model
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the confirmation gate forwarded to the loop
    pub fn with_confirmation_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.confirmation_gate = Some(gate);
        self
    }

    /// Set the telemetry sink
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Handle one turn to completion. Never panics and never returns `Err`;
    /// orchestration failures become error-status chat results.
    pub async fn handle(
        &self,
        turn: &mut Turn,
        invocation: &LoopInvocation,
        sink: Box<dyn OutputSink>,
        pause: PauseController,
        cancel: CancellationSignal,
    ) -> ChatResult {
        let mut pipeline = ResponsePipeline::standard(sink, &self.config);

        let mut engine = ToolCallingLoop::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.executor),
            Arc::clone(&self.prompt_builder),
            self.config.clone(),
        )
        .with_tools(self.tools.clone())
        .with_telemetry(Arc::clone(&self.telemetry))
        .with_pause(pause)
        .with_cancellation(cancel);
        if let Some(gate) = &self.confirmation_gate {
            engine = engine.with_confirmation_gate(Arc::clone(gate));
        }

        let outcome = engine.run(invocation, &mut pipeline).await;

        let result = match outcome {
            Ok(loop_result) => self.apply_outcome(turn, loop_result, &mut pipeline),
            Err(err) => self.apply_failure(turn, err),
        };

        pipeline.finish(turn);

        ChatResult {
            turn_id: turn.id,
            status: result.0,
            error_detail: result.1,
            response: turn.response().map(str::to_string),
            metadata: turn.metadata.clone(),
        }
    }

    fn apply_outcome(
        &self,
        turn: &mut Turn,
        outcome: LoopResult,
        pipeline: &mut ResponsePipeline,
    ) -> (TurnStatus, Option<ErrorDetail>) {
        let response_text = outcome.response_text();
        let request_id = outcome.fetch_result.request_id().to_string();
        let references_suppressed = outcome.references_suppressed;
        let classification = outcome.classification;
        let loop_metadata = outcome.metadata;

        turn.metadata.merge(classification.metadata);
        turn.metadata.merge(loop_metadata);
        if references_suppressed {
            turn.metadata.insert(keys::REFERENCES_SUPPRESSED, true);
        }

        let response = match classification.status {
            TurnStatus::Success => Some(response_text),
            TurnStatus::OffTopic => {
                // The rejection is the sole content of an off-topic turn.
                let rejection = classification
                    .rejection_text
                    .clone()
                    .unwrap_or_else(|| self.config.off_topic_message.clone());
                pipeline.push(OutputPart::text(rejection.clone()));
                Some(rejection)
            }
            _ => None,
        };

        self.record(turn, classification.status, response);

        match classification.status {
            TurnStatus::Success => {
                self.telemetry.record(TelemetryEvent::ResponseDisplayed {
                    turn_id: turn.id,
                    request_id: Some(request_id),
                });
            }
            status => {
                self.telemetry.record(TelemetryEvent::RequestFailed {
                    turn_id: turn.id,
                    status,
                    message: classification
                        .error_detail
                        .as_ref()
                        .map(|detail| detail.message.clone()),
                });
            }
        }

        (classification.status, classification.error_detail)
    }

    fn apply_failure(&self, turn: &mut Turn, err: LoopError) -> (TurnStatus, Option<ErrorDetail>) {
        tracing::error!(
            target: "turnloop.handler",
            turn_id = %turn.id,
            error = %err,
            "turn failed with an orchestration error"
        );
        let detail = ErrorDetail::new(ErrorKind::Configuration, err.to_string());
        self.telemetry.record(TelemetryEvent::RequestFailed {
            turn_id: turn.id,
            status: TurnStatus::Error,
            message: Some(detail.message.clone()),
        });
        self.record(turn, TurnStatus::Error, None);
        (TurnStatus::Error, Some(detail))
    }

    fn record(&self, turn: &mut Turn, status: TurnStatus, response: Option<String>) {
        if let Err(err) = turn.record(status, response) {
            tracing::warn!(
                target: "turnloop.handler",
                turn_id = %turn.id,
                error = %err,
                "turn outcome was already recorded"
            );
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Telemetry events
//!
//! The request handler emits one terminal event per turn plus occasional
//! stream samples. Sinks are fire-and-forget; a sink must never fail the
//! turn it is reporting on.

use uuid::Uuid;

use crate::turn::TurnStatus;

/// An event worth reporting to the host's telemetry backend.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// A successful response reached the user
    ResponseDisplayed {
        turn_id: Uuid,
        request_id: Option<String>,
    },
    /// The turn ended without a successful response
    RequestFailed {
        turn_id: Uuid,
        status: TurnStatus,
        message: Option<String>,
    },
    /// Volume sample for one completed stream
    StreamSampled {
        request_id: Option<String>,
        parts: usize,
        chars: usize,
    },
}

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Sink that forwards events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::ResponseDisplayed {
                turn_id,
                request_id,
            } => {
                tracing::info!(
                    target: "turnloop.telemetry",
                    %turn_id,
                    request_id = request_id.as_deref().unwrap_or("unknown"),
                    "response displayed"
                );
            }
            TelemetryEvent::RequestFailed {
                turn_id,
                status,
                message,
            } => {
                tracing::warn!(
                    target: "turnloop.telemetry",
                    %turn_id,
                    ?status,
                    message = message.as_deref().unwrap_or(""),
                    "request failed"
                );
            }
            TelemetryEvent::StreamSampled {
                request_id,
                parts,
                chars,
            } => {
                tracing::debug!(
                    target: "turnloop.telemetry",
                    request_id = request_id.as_deref().unwrap_or("unknown"),
                    parts,
                    chars,
                    "stream sampled"
                );
            }
        }
    }
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Sink that captures events for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: std::sync::Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every recorded event
    pub fn events(&self) -> Vec<TelemetryEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_captures_events() {
        let sink = RecordingTelemetry::new();
        let turn_id = Uuid::new_v4();

        sink.record(TelemetryEvent::ResponseDisplayed {
            turn_id,
            request_id: Some("r1".to_string()),
        });
        sink.record(TelemetryEvent::RequestFailed {
            turn_id,
            status: TurnStatus::Error,
            message: Some("boom".to_string()),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            TelemetryEvent::ResponseDisplayed { turn_id: id, .. } if *id == turn_id
        ));
    }

    #[test]
    fn test_noop_sink_accepts_events() {
        let sink = NoopTelemetry;
        sink.record(TelemetryEvent::StreamSampled {
            request_id: None,
            parts: 3,
            chars: 42,
        });
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock transport for testing
//!
//! Provides a scriptable implementation of the [`Transport`] trait that can
//! drive multi-round conversations in tests without a real model behind it.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine::pause::CancellationSignal;
use crate::fetch::{FetchRequest, FetchResult, ResponseDelta, Transport};
use crate::turn::round::ToolCall;

/// One scripted exchange: the deltas to stream, then the terminal result.
#[derive(Debug, Clone)]
pub struct ScriptedFetch {
    /// Deltas streamed before the result returns
    pub deltas: Vec<ResponseDelta>,
    /// Terminal result for this exchange
    pub result: FetchResult,
}

impl ScriptedFetch {
    /// Script a result with deltas derived from it: success text becomes a
    /// single text delta and each tool call becomes a tool-call delta.
    pub fn from_result(result: FetchResult) -> Self {
        let mut deltas = Vec::new();
        if !result.text().is_empty() {
            deltas.push(ResponseDelta::Text(result.text().to_string()));
        }
        for call in result.tool_calls() {
            deltas.push(ResponseDelta::ToolCall(call.clone()));
        }
        Self { deltas, result }
    }
}

/// A scriptable mock transport.
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<ScriptedFetch>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
    call_count: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Create a mock with an empty script. An exhausted script yields a
    /// default success result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a terminal result; deltas are derived from it
    pub fn with_result(self, result: FetchResult) -> Self {
        self.push_result(result);
        self
    }

    /// Queue a fully scripted exchange
    pub fn with_scripted(self, scripted: ScriptedFetch) -> Self {
        self.push_scripted(scripted);
        self
    }

    /// Queue a terminal result after construction
    pub fn push_result(&self, result: FetchResult) {
        self.push_scripted(ScriptedFetch::from_result(result));
    }

    /// Queue a scripted exchange after construction
    pub fn push_scripted(&self, scripted: ScriptedFetch) {
        let mut script = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("mock transport script lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        script.push_back(scripted);
    }

    /// Number of requests issued so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Copies of every request issued so far
    pub fn requests(&self) -> Vec<FetchRequest> {
        match self.requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Convenience: a success result with text and tool calls
    pub fn success(request_id: &str, text: &str, tool_calls: Vec<ToolCall>) -> FetchResult {
        FetchResult::Success {
            request_id: request_id.to_string(),
            text: text.to_string(),
            tool_calls,
        }
    }

    fn next_scripted(&self) -> ScriptedFetch {
        let mut script = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        script.pop_front().unwrap_or_else(|| {
            ScriptedFetch::from_result(FetchResult::Success {
                request_id: "mock-req".to_string(),
                text: "mock response".to_string(),
                tool_calls: vec![],
            })
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        request: FetchRequest,
        on_delta: &mut (dyn FnMut(ResponseDelta) + Send),
        cancel: &CancellationSignal,
    ) -> FetchResult {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        {
            let mut requests = match self.requests.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            requests.push(request);
        }

        if cancel.is_cancelled() {
            return FetchResult::Canceled {
                request_id: "mock-req".to_string(),
            };
        }

        let scripted = self.next_scripted();
        for delta in scripted.deltas {
            on_delta(delta);
        }
        scripted.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pause::CancellationSource;
    use crate::prompt::PromptMessage;

    fn request() -> FetchRequest {
        FetchRequest {
            model: "mock".to_string(),
            messages: vec![PromptMessage::user("hi")],
            tools: vec![],
            temperature: 0.7,
            max_tokens: 256,
            tool_call_limit: 5,
        }
    }

    #[tokio::test]
    async fn test_mock_streams_scripted_deltas() {
        let transport = MockTransport::new().with_result(MockTransport::success(
            "r1",
            "hello",
            vec![ToolCall::new("c1", "grep", serde_json::json!({}))],
        ));
        let (_source, cancel) = CancellationSource::new();

        let mut deltas = Vec::new();
        let result = transport
            .request(request(), &mut |d| deltas.push(d), &cancel)
            .await;

        assert_eq!(deltas.len(), 2);
        assert!(matches!(&deltas[0], ResponseDelta::Text(t) if t == "hello"));
        assert!(result.is_success());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_exhausted_script_yields_default() {
        let transport = MockTransport::new();
        let (_source, cancel) = CancellationSource::new();

        let result = transport.request(request(), &mut |_| {}, &cancel).await;
        assert!(result.is_success());
        assert_eq!(result.text(), "mock response");
    }

    #[tokio::test]
    async fn test_mock_observes_cancellation() {
        let transport = MockTransport::new().with_result(MockTransport::success("r1", "hi", vec![]));
        let (source, cancel) = CancellationSource::new();
        source.cancel();

        let result = transport.request(request(), &mut |_| {}, &cancel).await;
        assert!(matches!(result, FetchResult::Canceled { .. }));
        // The scripted result stays queued for a later call.
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let transport = MockTransport::new();
        let (_source, cancel) = CancellationSource::new();
        transport.request(request(), &mut |_| {}, &cancel).await;

        let recorded = transport.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].model, "mock");
        assert_eq!(recorded[0].tool_call_limit, 5);
    }
}

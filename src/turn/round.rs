// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool-call rounds
//!
//! A round is one request/response exchange with the model inside a turn:
//! the text the model replied with and the tool calls it requested. Rounds
//! are immutable once produced and accumulate in strict order. Tool results
//! live in a separate write-once map keyed by call id, so the association
//! between a call and its result is set at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fetch::FetchKind;

/// A model-requested invocation of an external capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call id within the turn
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool arguments as JSON
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of executing one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this result answers
    pub call_id: String,
    /// Result content fed back to the model
    pub content: String,
    /// Whether the tool reported a failure
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: message.into(),
            is_error: true,
        }
    }
}

/// One completed request/response exchange within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRound {
    /// The model's text response for this round
    pub text: String,
    /// Tool calls requested by the model, in order
    pub tool_calls: Vec<ToolCall>,
    /// Kind of the fetch result that produced this round
    pub fetch_kind: FetchKind,
    /// Request id of the fetch that produced this round
    pub request_id: String,
    /// When the round completed
    pub completed_at: DateTime<Utc>,
}

impl ToolCallRound {
    /// Create a new round
    pub fn new(
        text: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        fetch_kind: FetchKind,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            fetch_kind,
            request_id: request_id.into(),
            completed_at: Utc::now(),
        }
    }

    /// Whether the model requested any tool calls this round
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Write-once map from tool-call id to result.
///
/// The first write for an id wins; later writes are rejected so the
/// id-to-result association stays idempotent for the life of the turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResults {
    results: BTreeMap<String, ToolResult>,
}

impl ToolCallResults {
    /// Create an empty result map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a result. Returns `false` if the call id already has one.
    pub fn insert(&mut self, result: ToolResult) -> bool {
        if self.results.contains_key(&result.call_id) {
            return false;
        }
        self.results.insert(result.call_id.clone(), result);
        true
    }

    /// Look up a result by call id
    pub fn get(&self, call_id: &str) -> Option<&ToolResult> {
        self.results.get(call_id)
    }

    /// Whether a call id has a result
    pub fn contains(&self, call_id: &str) -> bool {
        self.results.contains_key(call_id)
    }

    /// Number of resolved calls
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no calls have resolved
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate over results in call-id order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolResult)> {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_new() {
        let call = ToolCall::new("c1", "file_read", serde_json::json!({"path": "src/lib.rs"}));
        assert_eq!(call.id, "c1");
        assert_eq!(call.name, "file_read");
        assert_eq!(call.arguments["path"], "src/lib.rs");
    }

    #[test]
    fn test_tool_result_constructors() {
        let ok = ToolResult::ok("c1", "contents");
        assert!(!ok.is_error);
        assert_eq!(ok.content, "contents");

        let err = ToolResult::error("c1", "not found");
        assert!(err.is_error);
        assert_eq!(err.content, "not found");
    }

    #[test]
    fn test_round_has_tool_calls() {
        let round = ToolCallRound::new("thinking", vec![], FetchKind::Success, "req-1");
        assert!(!round.has_tool_calls());

        let round = ToolCallRound::new(
            "",
            vec![ToolCall::new("c1", "grep", serde_json::json!({}))],
            FetchKind::Success,
            "req-2",
        );
        assert!(round.has_tool_calls());
    }

    #[test]
    fn test_results_write_once() {
        let mut results = ToolCallResults::new();
        assert!(results.insert(ToolResult::ok("c1", "first")));
        assert!(!results.insert(ToolResult::ok("c1", "second")));

        // First write wins.
        assert_eq!(results.get("c1").unwrap().content, "first");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_results_lookup() {
        let mut results = ToolCallResults::new();
        results.insert(ToolResult::error("c2", "boom"));

        assert!(results.contains("c2"));
        assert!(!results.contains("c1"));
        assert!(results.get("c2").unwrap().is_error);
    }

    #[test]
    fn test_results_iteration_order() {
        let mut results = ToolCallResults::new();
        results.insert(ToolResult::ok("b", "2"));
        results.insert(ToolResult::ok("a", "1"));

        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Prompt construction seam
//!
//! The loop delegates message assembly to a [`PromptBuilder`]. Each build
//! sees the originating request, any prior conversation history, every
//! accumulated round, and all tool results resolved so far, so round *n*'s
//! prompt always reflects round *n-1*'s fully resolved tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::turn::round::{ToolCallResults, ToolCallRound};

/// Message role in the prompt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the prompt context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role
    pub role: Role,
    /// Message content
    pub content: String,
}

impl PromptMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a tool-result message
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// A workspace resource referenced by the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Resource URI or workspace-relative path
    pub uri: String,
}

impl Reference {
    /// Create a reference
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Output of one prompt build.
#[derive(Debug, Clone, Default)]
pub struct PromptBuildResult {
    /// Messages to send to the model
    pub messages: Vec<PromptMessage>,
    /// References surfaced to the user
    pub references: Vec<Reference>,
    /// References suppressed by access policy
    pub omitted_references: Vec<Reference>,
    /// Free-form annotations for telemetry
    pub telemetry: BTreeMap<String, String>,
}

/// Everything a prompt build may draw on.
#[derive(Debug)]
pub struct PromptContext<'a> {
    /// The originating request text
    pub request: &'a str,
    /// Conversation history preceding this turn
    pub history: &'a [PromptMessage],
    /// Rounds accumulated so far in this turn
    pub rounds: &'a [ToolCallRound],
    /// Tool results resolved so far
    pub tool_results: &'a ToolCallResults,
    /// Extra contextual variables supplied by the invocation target
    pub variables: &'a BTreeMap<String, String>,
}

/// Builds the message context for one fetch.
#[async_trait]
pub trait PromptBuilder: Send + Sync {
    async fn build(&self, context: &PromptContext<'_>) -> Result<PromptBuildResult>;
}

/// Default builder that flattens history, request, rounds, and tool results
/// into a plain transcript.
#[derive(Debug, Clone, Default)]
pub struct TranscriptPromptBuilder {
    /// Optional system prompt prepended to every build
    pub system: Option<String>,
}

impl TranscriptPromptBuilder {
    /// Create a builder with a system prompt
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
        }
    }
}

#[async_trait]
impl PromptBuilder for TranscriptPromptBuilder {
    async fn build(&self, context: &PromptContext<'_>) -> Result<PromptBuildResult> {
        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(PromptMessage::system(system.clone()));
        }
        messages.extend_from_slice(context.history);
        messages.push(PromptMessage::user(context.request.to_string()));

        for round in context.rounds {
            if !round.text.is_empty() {
                messages.push(PromptMessage::assistant(round.text.clone()));
            }
            for call in &round.tool_calls {
                messages.push(PromptMessage::assistant(format!(
                    "[tool call {}: {} {}]",
                    call.id, call.name, call.arguments
                )));
                if let Some(result) = context.tool_results.get(&call.id) {
                    messages.push(PromptMessage::tool(format!(
                        "[{}] {}",
                        call.id, result.content
                    )));
                }
            }
        }

        Ok(PromptBuildResult {
            messages,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchKind;
    use crate::turn::round::{ToolCall, ToolResult};

    fn empty_vars() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[tokio::test]
    async fn test_transcript_builder_basic() {
        let builder = TranscriptPromptBuilder::with_system("be helpful");
        let vars = empty_vars();
        let results = ToolCallResults::new();
        let context = PromptContext {
            request: "list the tests",
            history: &[],
            rounds: &[],
            tool_results: &results,
            variables: &vars,
        };

        let build = builder.build(&context).await.unwrap();
        assert_eq!(build.messages.len(), 2);
        assert_eq!(build.messages[0].role, Role::System);
        assert_eq!(build.messages[1].role, Role::User);
        assert_eq!(build.messages[1].content, "list the tests");
    }

    #[tokio::test]
    async fn test_transcript_builder_includes_resolved_tool_results() {
        let builder = TranscriptPromptBuilder::default();
        let vars = empty_vars();

        let call = ToolCall::new("c1", "file_read", serde_json::json!({"path": "a.rs"}));
        let rounds = vec![ToolCallRound::new(
            "let me look",
            vec![call],
            FetchKind::Success,
            "r1",
        )];
        let mut results = ToolCallResults::new();
        results.insert(ToolResult::ok("c1", "fn main() {}"));

        let context = PromptContext {
            request: "what does a.rs do",
            history: &[],
            rounds: &rounds,
            tool_results: &results,
            variables: &vars,
        };

        let build = builder.build(&context).await.unwrap();
        let transcript: Vec<&str> = build.messages.iter().map(|m| m.content.as_str()).collect();
        assert!(transcript.iter().any(|c| c.contains("let me look")));
        assert!(transcript.iter().any(|c| c.contains("fn main() {}")));
        // Tool result follows the call that produced it.
        let call_pos = transcript
            .iter()
            .position(|c| c.contains("tool call c1"))
            .unwrap();
        let result_pos = transcript
            .iter()
            .position(|c| c.contains("fn main() {}"))
            .unwrap();
        assert!(result_pos > call_pos);
    }

    #[tokio::test]
    async fn test_transcript_builder_history_precedes_request() {
        let builder = TranscriptPromptBuilder::default();
        let vars = empty_vars();
        let results = ToolCallResults::new();
        let history = vec![
            PromptMessage::user("earlier question"),
            PromptMessage::assistant("earlier answer"),
        ];
        let context = PromptContext {
            request: "follow-up",
            history: &history,
            rounds: &[],
            tool_results: &results,
            variables: &vars,
        };

        let build = builder.build(&context).await.unwrap();
        assert_eq!(build.messages[0].content, "earlier question");
        assert_eq!(build.messages[2].content, "follow-up");
    }
}

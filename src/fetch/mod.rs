// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Transport seam and fetch results
//!
//! The completion transport is an external collaborator behind the
//! [`Transport`] trait: it streams zero or more [`ResponseDelta`]s through a
//! callback, then returns exactly one terminal [`FetchResult`] tagged with a
//! kind from a closed set. Classified transport failures are data, never
//! `Err`; the classifier turns them into chat results downstream.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::pause::CancellationSignal;
use crate::prompt::PromptMessage;
use crate::tools::ToolDescriptor;
use crate::turn::round::ToolCall;

/// Category reported by a response-side content filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCategory {
    Hate,
    SelfHarm,
    Sexual,
    Violence,
    Jailbreak,
    Unspecified,
}

impl FilterCategory {
    /// Stable string form used in turn metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterCategory::Hate => "hate",
            FilterCategory::SelfHarm => "self_harm",
            FilterCategory::Sexual => "sexual",
            FilterCategory::Violence => "violence",
            FilterCategory::Jailbreak => "jailbreak",
            FilterCategory::Unspecified => "unspecified",
        }
    }
}

/// Kind tag for a terminal fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    Success,
    OffTopic,
    Canceled,
    QuotaExceeded,
    RateLimited,
    BadRequest,
    NetworkError,
    Failed,
    Filtered,
    PromptFiltered,
    AgentUnauthorized,
    AgentFailedDependency,
    Length,
    NotFound,
    Unknown,
    ExtensionBlocked,
    InvalidStatefulMarker,
}

/// Terminal outcome of one model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchResult {
    /// The model answered; text and tool calls may both be empty
    Success {
        request_id: String,
        text: String,
        tool_calls: Vec<ToolCall>,
    },
    /// The request was rejected as off topic
    OffTopic { request_id: String },
    /// The request was cancelled before completing
    Canceled { request_id: String },
    /// Usage quota exhausted
    QuotaExceeded {
        request_id: String,
        retry_after_secs: Option<u64>,
    },
    /// Too many requests
    RateLimited {
        request_id: String,
        retry_after_secs: Option<u64>,
    },
    /// The transport rejected the request shape
    BadRequest { request_id: String, message: String },
    /// Network-level failure
    NetworkError { request_id: String, message: String },
    /// Generic transport failure
    Failed { request_id: String, message: String },
    /// The response was blocked by a content filter
    Filtered {
        request_id: String,
        category: FilterCategory,
    },
    /// The prompt itself was blocked by a content filter
    PromptFiltered { request_id: String },
    /// The agent endpoint rejected the caller's authorization
    AgentUnauthorized { request_id: String },
    /// An agent dependency failed upstream
    AgentFailedDependency { request_id: String, message: String },
    /// The response was truncated at the token limit; carries the partial text
    Length { request_id: String, text: String },
    /// The requested model or endpoint was not found
    NotFound { request_id: String, message: String },
    /// Unclassified failure
    Unknown { request_id: String, message: String },
    /// A required extension blocked the request
    ExtensionBlocked { request_id: String, message: String },
    /// The transport observed an invalid stateful marker. Must never reach
    /// the classifier; doing so is an upstream contract violation.
    InvalidStatefulMarker { request_id: String },
}

impl FetchResult {
    /// The kind tag of this result
    pub fn kind(&self) -> FetchKind {
        match self {
            FetchResult::Success { .. } => FetchKind::Success,
            FetchResult::OffTopic { .. } => FetchKind::OffTopic,
            FetchResult::Canceled { .. } => FetchKind::Canceled,
            FetchResult::QuotaExceeded { .. } => FetchKind::QuotaExceeded,
            FetchResult::RateLimited { .. } => FetchKind::RateLimited,
            FetchResult::BadRequest { .. } => FetchKind::BadRequest,
            FetchResult::NetworkError { .. } => FetchKind::NetworkError,
            FetchResult::Failed { .. } => FetchKind::Failed,
            FetchResult::Filtered { .. } => FetchKind::Filtered,
            FetchResult::PromptFiltered { .. } => FetchKind::PromptFiltered,
            FetchResult::AgentUnauthorized { .. } => FetchKind::AgentUnauthorized,
            FetchResult::AgentFailedDependency { .. } => FetchKind::AgentFailedDependency,
            FetchResult::Length { .. } => FetchKind::Length,
            FetchResult::NotFound { .. } => FetchKind::NotFound,
            FetchResult::Unknown { .. } => FetchKind::Unknown,
            FetchResult::ExtensionBlocked { .. } => FetchKind::ExtensionBlocked,
            FetchResult::InvalidStatefulMarker { .. } => FetchKind::InvalidStatefulMarker,
        }
    }

    /// The request id attached by the transport
    pub fn request_id(&self) -> &str {
        match self {
            FetchResult::Success { request_id, .. }
            | FetchResult::OffTopic { request_id }
            | FetchResult::Canceled { request_id }
            | FetchResult::QuotaExceeded { request_id, .. }
            | FetchResult::RateLimited { request_id, .. }
            | FetchResult::BadRequest { request_id, .. }
            | FetchResult::NetworkError { request_id, .. }
            | FetchResult::Failed { request_id, .. }
            | FetchResult::Filtered { request_id, .. }
            | FetchResult::PromptFiltered { request_id }
            | FetchResult::AgentUnauthorized { request_id }
            | FetchResult::AgentFailedDependency { request_id, .. }
            | FetchResult::Length { request_id, .. }
            | FetchResult::NotFound { request_id, .. }
            | FetchResult::Unknown { request_id, .. }
            | FetchResult::ExtensionBlocked { request_id, .. }
            | FetchResult::InvalidStatefulMarker { request_id } => request_id,
        }
    }

    /// Whether this is a success result
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }

    /// Text carried by the result. Empty for kinds without text.
    pub fn text(&self) -> &str {
        match self {
            FetchResult::Success { text, .. } | FetchResult::Length { text, .. } => text,
            _ => "",
        }
    }

    /// Tool calls requested by the model. Empty for non-success kinds.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            FetchResult::Success { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Incremental delta streamed while a request is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseDelta {
    /// A chunk of response text
    Text(String),
    /// The model began requesting a tool call
    ToolCall(ToolCall),
}

/// One model request as seen by the transport.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Model identifier
    pub model: String,
    /// Messages in the prompt context
    pub messages: Vec<PromptMessage>,
    /// Tools visible to the model
    pub tools: Vec<ToolDescriptor>,
    /// Sampling temperature for this attempt
    pub temperature: f32,
    /// Maximum response tokens
    pub max_tokens: u32,
    /// Tool-call round limit communicated to the model
    pub tool_call_limit: u32,
}

/// The completion transport.
///
/// One call issues one request. Deltas arrive through `on_delta` before the
/// terminal result returns; the transport observes `cancel` and reports
/// cancellation as a [`FetchResult::Canceled`] result rather than an error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        request: FetchRequest,
        on_delta: &mut (dyn FnMut(ResponseDelta) + Send),
        cancel: &CancellationSignal,
    ) -> FetchResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_result_kind_mapping() {
        let success = FetchResult::Success {
            request_id: "r1".to_string(),
            text: "hi".to_string(),
            tool_calls: vec![],
        };
        assert_eq!(success.kind(), FetchKind::Success);
        assert!(success.is_success());

        let canceled = FetchResult::Canceled {
            request_id: "r2".to_string(),
        };
        assert_eq!(canceled.kind(), FetchKind::Canceled);
        assert!(!canceled.is_success());
    }

    #[test]
    fn test_fetch_result_request_id() {
        let result = FetchResult::RateLimited {
            request_id: "req-42".to_string(),
            retry_after_secs: Some(30),
        };
        assert_eq!(result.request_id(), "req-42");
    }

    #[test]
    fn test_fetch_result_text_and_tool_calls() {
        let result = FetchResult::Success {
            request_id: "r1".to_string(),
            text: "let me check".to_string(),
            tool_calls: vec![ToolCall::new("c1", "grep", serde_json::json!({}))],
        };
        assert_eq!(result.text(), "let me check");
        assert_eq!(result.tool_calls().len(), 1);

        let failed = FetchResult::Failed {
            request_id: "r2".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(failed.text(), "");
        assert!(failed.tool_calls().is_empty());
    }

    #[test]
    fn test_length_carries_partial_text() {
        let result = FetchResult::Length {
            request_id: "r3".to_string(),
            text: "partial".to_string(),
        };
        assert_eq!(result.text(), "partial");
        assert!(result.tool_calls().is_empty());
    }

    #[test]
    fn test_filter_category_as_str() {
        assert_eq!(FilterCategory::SelfHarm.as_str(), "self_harm");
        assert_eq!(FilterCategory::Unspecified.as_str(), "unspecified");
    }

    #[test]
    fn test_fetch_result_serde_tag() {
        let result = FetchResult::OffTopic {
            request_id: "r1".to_string(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"kind\":\"off_topic\""));
    }
}

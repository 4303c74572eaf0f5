// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for turnloop
//!
//! Two layers of errors live here. [`LoopError`] covers orchestration and
//! contract failures that propagate with `?` and are caught once at the
//! request-handler level. Classified transport outcomes are *not* errors:
//! they travel as [`FetchResult`](crate::fetch::FetchResult) variants and
//! become structured [`ErrorDetail`] values on the final chat result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Orchestration errors raised while driving a turn.
#[derive(Error, Debug)]
pub enum LoopError {
    /// The upstream transport broke its contract (for example an invalid
    /// stateful marker reached the classifier)
    #[error("transport contract violation: {0}")]
    Contract(String),

    /// A turn outcome was recorded a second time
    #[error("turn {0} already has a recorded outcome")]
    TurnAlreadyRecorded(uuid::Uuid),

    /// Prompt construction failed
    #[error("prompt build failed: {0}")]
    PromptBuild(String),

    /// The confirmation gate could not resolve a pending confirmation
    #[error("confirmation failed: {0}")]
    Confirmation(String),

    /// Invalid loop configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for turnloop operations
pub type Result<T> = std::result::Result<T, LoopError>;

/// Category of a terminal, user-facing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, rate-limit, and quota failures from the transport
    Transport,
    /// Response or prompt rejected by a content policy
    ContentPolicy,
    /// The agent lacked authorization for the request
    Authorization,
    /// The model produced neither text nor tool calls
    EmptyResponse,
    /// A tool aborted the turn
    ToolCancellation,
    /// The user aborted the turn
    UserCancellation,
    /// Internal misconfiguration or contract violation
    Configuration,
}

/// Structured error detail attached to a terminal chat result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Failure category
    pub kind: ErrorKind,
    /// User-facing message
    pub message: String,
}

impl ErrorDetail {
    /// Create a new error detail
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_error_contract() {
        let err = LoopError::Contract("invalid stateful marker".to_string());
        assert!(err.to_string().contains("contract violation"));
        assert!(err.to_string().contains("invalid stateful marker"));
    }

    #[test]
    fn test_loop_error_turn_already_recorded() {
        let id = uuid::Uuid::new_v4();
        let err = LoopError::TurnAlreadyRecorded(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_loop_error_config() {
        let err = LoopError::Config("round limit must be positive".to_string());
        assert!(err.to_string().contains("configuration error"));
    }

    #[test]
    fn test_loop_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: LoopError = json_err.into();
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_error_detail_new() {
        let detail = ErrorDetail::new(ErrorKind::Transport, "rate limited");
        assert_eq!(detail.kind, ErrorKind::Transport);
        assert_eq!(detail.message, "rate limited");
    }

    #[test]
    fn test_error_kind_equality() {
        assert_eq!(ErrorKind::Transport, ErrorKind::Transport);
        assert_ne!(ErrorKind::ToolCancellation, ErrorKind::UserCancellation);
    }

    #[test]
    fn test_error_detail_serde_roundtrip() {
        let detail = ErrorDetail::new(ErrorKind::EmptyResponse, "no response");
        let json = serde_json::to_string(&detail).unwrap();
        let back: ErrorDetail = serde_json::from_str(&json).unwrap();
        assert_eq!(back, detail);
    }
}

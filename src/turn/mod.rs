// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Turn state
//!
//! A [`Turn`] is one user request and its eventual outcome within a
//! conversation. The request handler records the outcome exactly once, when
//! it is known; collaborators attach open-ended metadata through
//! [`TurnMetadata`].

pub mod round;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LoopError, Result};

/// Well-known metadata keys set by the core.
pub mod keys {
    /// Set when the round limit terminated the loop
    pub const MAX_TOOL_CALLS_EXCEEDED: &str = "max_tool_calls_exceeded";
    /// Category recorded for filtered responses and prompts
    pub const FILTER_CATEGORY: &str = "filter_category";
    /// Set when prompt references were suppressed by access policy
    pub const REFERENCES_SUPPRESSED: &str = "references_suppressed";
    /// Paths touched by edit parts, collected by the stream pipeline
    pub const EDITED_FILES: &str = "edited_files";
    /// Total stream parts observed by the usage collector
    pub const STREAM_PARTS: &str = "stream_parts";
    /// Total text characters observed by the usage collector
    pub const STREAM_CHARS: &str = "stream_chars";
}

/// Terminal status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The model produced a usable response
    Success,
    /// The turn failed; see the error detail on the chat result
    Error,
    /// The turn was cancelled by the user or a tool
    Cancelled,
    /// The request was rejected as off topic
    OffTopic,
    /// The response was blocked by a content filter
    Filtered,
    /// The prompt itself was blocked by a content filter
    PromptFiltered,
}

/// Open-ended keyed attachments set by collaborators during a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata(BTreeMap<String, serde_json::Value>);

impl TurnMetadata {
    /// Create an empty metadata bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Fold another bag into this one; later entries win
    pub fn merge(&mut self, other: TurnMetadata) {
        self.0.extend(other.0);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// One user request and its eventual outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn identifier
    pub id: Uuid,

    /// The originating request text
    pub request: String,

    /// When the turn was created
    pub started_at: DateTime<Utc>,

    /// Open metadata bag
    pub metadata: TurnMetadata,

    status: Option<TurnStatus>,
    response: Option<String>,
}

impl Turn {
    /// Create a new turn for a request
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request: request.into(),
            started_at: Utc::now(),
            metadata: TurnMetadata::new(),
            status: None,
            response: None,
        }
    }

    /// The recorded terminal status, if the turn has completed
    pub fn status(&self) -> Option<TurnStatus> {
        self.status
    }

    /// The recorded response content, if any
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Whether an outcome has been recorded
    pub fn is_recorded(&self) -> bool {
        self.status.is_some()
    }

    /// Record the turn outcome. May be called at most once.
    pub fn record(&mut self, status: TurnStatus, response: Option<String>) -> Result<()> {
        if self.status.is_some() {
            return Err(LoopError::TurnAlreadyRecorded(self.id));
        }
        self.status = Some(status);
        self.response = response;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== Turn tests =====

    #[test]
    fn test_turn_new() {
        let turn = Turn::new("fix the failing test");
        assert_eq!(turn.request, "fix the failing test");
        assert!(turn.status().is_none());
        assert!(turn.response().is_none());
        assert!(!turn.is_recorded());
        assert!(turn.metadata.is_empty());
    }

    #[test]
    fn test_turn_record_once() {
        let mut turn = Turn::new("hello");
        turn.record(TurnStatus::Success, Some("done".to_string()))
            .unwrap();

        assert_eq!(turn.status(), Some(TurnStatus::Success));
        assert_eq!(turn.response(), Some("done"));
        assert!(turn.is_recorded());
    }

    #[test]
    fn test_turn_record_twice_fails() {
        let mut turn = Turn::new("hello");
        turn.record(TurnStatus::Success, None).unwrap();

        let err = turn.record(TurnStatus::Error, None).unwrap_err();
        assert!(matches!(err, LoopError::TurnAlreadyRecorded(id) if id == turn.id));
        // First outcome is preserved.
        assert_eq!(turn.status(), Some(TurnStatus::Success));
    }

    #[test]
    fn test_turn_record_without_response() {
        let mut turn = Turn::new("hello");
        turn.record(TurnStatus::Cancelled, None).unwrap();
        assert_eq!(turn.status(), Some(TurnStatus::Cancelled));
        assert!(turn.response().is_none());
    }

    // ===== TurnMetadata tests =====

    #[test]
    fn test_metadata_insert_and_get() {
        let mut metadata = TurnMetadata::new();
        metadata.insert(keys::MAX_TOOL_CALLS_EXCEEDED, true);
        metadata.insert(keys::FILTER_CATEGORY, "prompt");

        assert_eq!(
            metadata.get(keys::MAX_TOOL_CALLS_EXCEEDED),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(
            metadata.get(keys::FILTER_CATEGORY).and_then(|v| v.as_str()),
            Some("prompt")
        );
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_metadata_merge_later_wins() {
        let mut a = TurnMetadata::new();
        a.insert("k", "old");
        let mut b = TurnMetadata::new();
        b.insert("k", "new");
        b.insert("other", 1);

        a.merge(b);
        assert_eq!(a.get("k").and_then(|v| v.as_str()), Some("new"));
        assert!(a.contains("other"));
    }

    #[test]
    fn test_metadata_serde_roundtrip() {
        let mut metadata = TurnMetadata::new();
        metadata.insert("count", 3);
        let json = serde_json::to_string(&metadata).unwrap();
        let back: TurnMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_turn_status_serde_names() {
        let json = serde_json::to_string(&TurnStatus::PromptFiltered).unwrap();
        assert_eq!(json, "\"prompt_filtered\"");
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool execution seam
//!
//! Tool calls requested by the model are dispatched to an external
//! [`ToolExecutor`]. Ordering and parallelism within a round belong to the
//! executor; the loop only waits for every call to resolve before moving on.
//! [`ToolGrouping`] is the seam for collapsing a large tool surface into
//! fewer prompt-visible groups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::turn::round::{ToolCall, ToolResult};

/// Failure modes of a single tool call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolCallError {
    /// The tool aborted the turn; the loop terminates with a cancelled status
    #[error("tool call cancelled")]
    Cancelled,

    /// The tool failed; the message is fed back to the model as an error result
    #[error("tool call failed: {0}")]
    Failed(String),
}

/// Executes model-requested tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn run(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolCallError>;
}

/// A tool as described to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Input schema (JSON Schema)
    pub input_schema: serde_json::Value,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Set the input schema
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Strategy for shaping the prompt-visible tool list.
///
/// Implementations may cache computed groupings; `invalidate` clears any
/// such cache when the available tool set changes.
pub trait ToolGrouping: Send + Sync {
    /// Produce the tool list for the next fetch
    fn compute(&mut self, tools: &[ToolDescriptor]) -> Vec<ToolDescriptor>;

    /// Drop any cached grouping state
    fn invalidate(&mut self);
}

/// Pass-through grouping: every available tool is prompt-visible.
#[derive(Debug, Default)]
pub struct NoGrouping;

impl ToolGrouping for NoGrouping {
    fn compute(&mut self, tools: &[ToolDescriptor]) -> Vec<ToolDescriptor> {
        tools.to_vec()
    }

    fn invalidate(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_descriptor_new() {
        let descriptor = ToolDescriptor::new("grep", "search the workspace");
        assert_eq!(descriptor.name, "grep");
        assert_eq!(descriptor.input_schema["type"], "object");
    }

    #[test]
    fn test_tool_descriptor_with_schema() {
        let descriptor = ToolDescriptor::new("file_read", "read a file").with_schema(
            serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        );
        assert_eq!(descriptor.input_schema["required"][0], "path");
    }

    #[test]
    fn test_no_grouping_passes_through() {
        let tools = vec![
            ToolDescriptor::new("a", "first"),
            ToolDescriptor::new("b", "second"),
        ];
        let mut grouping = NoGrouping;
        let visible = grouping.compute(&tools);
        assert_eq!(visible, tools);
        grouping.invalidate();
        assert_eq!(grouping.compute(&tools).len(), 2);
    }

    #[test]
    fn test_tool_call_error_display() {
        assert_eq!(
            ToolCallError::Cancelled.to_string(),
            "tool call cancelled"
        );
        assert!(ToolCallError::Failed("no such file".to_string())
            .to_string()
            .contains("no such file"));
    }
}

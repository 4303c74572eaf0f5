// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Output stream primitives
//!
//! The core never renders anything: it pushes typed [`OutputPart`]s into an
//! [`OutputSink`] owned by the host. [`pipeline`] composes observing
//! adapters around the raw sink.

pub mod pipeline;

use serde::{Deserialize, Serialize};

/// A typed part of the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputPart {
    /// Markdown-capable text
    Text { text: String },
    /// A proposed or applied file edit
    Edit { path: String, description: String },
    /// A workspace reference surfaced to the user
    Reference { uri: String },
    /// Transient progress message
    Progress { message: String },
    /// A confirmation button pair awaiting user resolution
    Confirmation {
        title: String,
        message: String,
        accepted: serde_json::Value,
        rejected: serde_json::Value,
    },
}

impl OutputPart {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        OutputPart::Text { text: text.into() }
    }

    /// Create a progress part
    pub fn progress(message: impl Into<String>) -> Self {
        OutputPart::Progress {
            message: message.into(),
        }
    }

    /// Stable name of the part type
    pub fn kind(&self) -> &'static str {
        match self {
            OutputPart::Text { .. } => "text",
            OutputPart::Edit { .. } => "edit",
            OutputPart::Reference { .. } => "reference",
            OutputPart::Progress { .. } => "progress",
            OutputPart::Confirmation { .. } => "confirmation",
        }
    }
}

/// Receives stream parts in order.
pub trait OutputSink: Send {
    fn push(&mut self, part: OutputPart);
}

/// Sink that captures every part, for tests and buffering hosts.
#[derive(Debug, Default)]
pub struct VecSink {
    /// Captured parts in arrival order
    pub parts: Vec<OutputPart>,
}

impl VecSink {
    /// Create an empty capture sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenated text content of all text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                OutputPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl OutputSink for VecSink {
    fn push(&mut self, part: OutputPart) {
        self.parts.push(part);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Loop configuration
//!
//! [`LoopConfig`] collects everything the tool-calling loop and the request
//! handler need to know up front: the round limit and what happens when it is
//! reached, temperature scaling bounds, and the user-facing message templates
//! used by the fetch-result classifier.

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, Result};

/// What the loop does when the accumulated round count reaches the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitBehavior {
    /// Terminate immediately and mark `max_tool_calls_exceeded` in metadata
    #[default]
    Stop,
    /// Surface a confirmation prompt and suspend until the user accepts or
    /// rejects continuing
    Confirm,
}

/// Configuration for one tool-calling loop invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Model identifier forwarded to the transport
    pub model: String,

    /// Maximum number of tool-call rounds per turn. Counts rounds, not
    /// individual tool calls, and must be strictly positive.
    pub max_tool_call_rounds: u32,

    /// Behavior when the round limit is reached
    pub limit_behavior: LimitBehavior,

    /// Base sampling temperature
    pub base_temperature: f32,

    /// Upper bound for retry-scaled temperature
    pub temperature_ceiling: f32,

    /// Maximum tokens in a model response
    pub max_response_tokens: u32,

    /// Request-level retry counter, supplied by the caller that re-invokes
    /// the loop. The loop never increments this itself; it only scales the
    /// temperature by `attempt + 1`.
    pub request_attempt: u32,

    /// Whether the link-rewriter stream adapter participates
    pub linkify: bool,

    /// When set, rate-limit and quota errors omit the retry time estimate
    pub omit_rate_limit_estimate: bool,

    /// Rejection message emitted as the sole content of an off-topic turn
    pub off_topic_message: String,

    /// Plan label woven into cancellation messages, when known
    pub plan_label: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            max_tool_call_rounds: 15,
            limit_behavior: LimitBehavior::Stop,
            base_temperature: 0.7,
            temperature_ceiling: 2.0,
            max_response_tokens: 4096,
            request_attempt: 0,
            linkify: true,
            omit_rate_limit_estimate: false,
            off_topic_message: "Sorry, I can only help with questions about your code."
                .to_string(),
            plan_label: None,
        }
    }
}

impl LoopConfig {
    /// Create a configuration for a specific model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the round limit
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_call_rounds = rounds;
        self
    }

    /// Set the limit behavior
    pub fn with_limit_behavior(mut self, behavior: LimitBehavior) -> Self {
        self.limit_behavior = behavior;
        self
    }

    /// Set the base temperature
    pub fn with_base_temperature(mut self, temperature: f32) -> Self {
        self.base_temperature = temperature;
        self
    }

    /// Set the temperature ceiling
    pub fn with_temperature_ceiling(mut self, ceiling: f32) -> Self {
        self.temperature_ceiling = ceiling;
        self
    }

    /// Set the request-level retry counter
    pub fn with_request_attempt(mut self, attempt: u32) -> Self {
        self.request_attempt = attempt;
        self
    }

    /// Enable or disable link rewriting in the response stream
    pub fn with_linkify(mut self, linkify: bool) -> Self {
        self.linkify = linkify;
        self
    }

    /// Omit retry time estimates from rate-limit and quota errors
    pub fn with_omit_rate_limit_estimate(mut self, omit: bool) -> Self {
        self.omit_rate_limit_estimate = omit;
        self
    }

    /// Set the off-topic rejection message
    pub fn with_off_topic_message(mut self, message: impl Into<String>) -> Self {
        self.off_topic_message = message.into();
        self
    }

    /// Set the plan label used in cancellation messages
    pub fn with_plan_label(mut self, label: impl Into<String>) -> Self {
        self.plan_label = Some(label.into());
        self
    }

    /// Check invariants before the loop starts.
    pub fn validate(&self) -> Result<()> {
        if self.max_tool_call_rounds == 0 {
            return Err(LoopError::Config(
                "max_tool_call_rounds must be strictly positive".to_string(),
            ));
        }
        if self.temperature_ceiling < self.base_temperature {
            return Err(LoopError::Config(format!(
                "temperature ceiling {} is below base temperature {}",
                self.temperature_ceiling, self.base_temperature
            )));
        }
        Ok(())
    }
}

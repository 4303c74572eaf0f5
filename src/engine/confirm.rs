// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Confirmation gate
//!
//! When the round limit is configured to confirm instead of stop, the loop
//! surfaces a confirmation request and blocks on the host's
//! [`ConfirmationGate`] until the user resolves it.

use async_trait::async_trait;

use crate::error::Result;

/// A pending continue/stop question surfaced to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationRequest {
    /// Short title for the confirmation UI
    pub title: String,
    /// Explanatory message
    pub message: String,
    /// Payload attached to the accepting choice
    pub accepted: serde_json::Value,
    /// Payload attached to the rejecting choice
    pub rejected: serde_json::Value,
}

/// The user's resolution of a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Continue the loop with an extended round allowance
    Accepted,
    /// Stop the loop where it stands
    Rejected,
}

/// Host-side resolution of confirmation requests.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn resolve(&self, request: &ConfirmationRequest) -> Result<ConfirmationOutcome>;
}

/// Gate that always answers the same way. Useful in tests and headless hosts.
pub struct FixedGate(pub ConfirmationOutcome);

#[async_trait]
impl ConfirmationGate for FixedGate {
    async fn resolve(&self, _request: &ConfirmationRequest) -> Result<ConfirmationOutcome> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_gate_answers() {
        let request = ConfirmationRequest {
            title: "Continue?".to_string(),
            message: "The tool call limit was reached.".to_string(),
            accepted: serde_json::json!({"choice": "continue"}),
            rejected: serde_json::json!({"choice": "stop"}),
        };

        let accept = FixedGate(ConfirmationOutcome::Accepted);
        assert_eq!(
            accept.resolve(&request).await.unwrap(),
            ConfirmationOutcome::Accepted
        );

        let reject = FixedGate(ConfirmationOutcome::Rejected);
        assert_eq!(
            reject.resolve(&request).await.unwrap(),
            ConfirmationOutcome::Rejected
        );
    }
}

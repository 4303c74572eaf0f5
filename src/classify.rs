// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Fetch-result classification
//!
//! Maps a terminal [`FetchResult`] to a turn status, an optional user-facing
//! error detail, and a metadata augmentation. Classification is pure and
//! idempotent: the same result always yields the same output. Side effects
//! (recording the turn, pushing rejection text, telemetry) belong to the
//! request handler.

use crate::config::LoopConfig;
use crate::error::{ErrorDetail, ErrorKind, LoopError, Result};
use crate::fetch::FetchResult;
use crate::turn::{keys, TurnMetadata, TurnStatus};

/// Which side initiated a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelOrigin {
    /// The user cancelled the request
    #[default]
    User,
    /// A tool aborted the turn
    Tool,
}

/// Inputs that shape classification messages.
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    /// Rejection message for off-topic results
    pub off_topic_message: String,
    /// Omit retry time estimates from quota and rate-limit errors
    pub omit_rate_limit_estimate: bool,
    /// Plan label woven into cancellation messages
    pub plan_label: Option<String>,
    /// Who initiated a cancellation, when the result is Canceled
    pub cancel_origin: CancelOrigin,
}

impl ClassifyOptions {
    /// Derive options from a loop configuration
    pub fn from_config(config: &LoopConfig) -> Self {
        Self {
            off_topic_message: config.off_topic_message.clone(),
            omit_rate_limit_estimate: config.omit_rate_limit_estimate,
            plan_label: config.plan_label.clone(),
            cancel_origin: CancelOrigin::User,
        }
    }

    /// Set the cancellation origin
    pub fn with_cancel_origin(mut self, origin: CancelOrigin) -> Self {
        self.cancel_origin = origin;
        self
    }
}

/// Output of classifying one terminal fetch result.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Terminal turn status
    pub status: TurnStatus,
    /// User-facing error detail, when one exists
    pub error_detail: Option<ErrorDetail>,
    /// Metadata to fold into the turn
    pub metadata: TurnMetadata,
    /// Text to emit as the sole stream content (off-topic rejection)
    pub rejection_text: Option<String>,
}

impl Classification {
    fn status_only(status: TurnStatus) -> Self {
        Self {
            status,
            error_detail: None,
            metadata: TurnMetadata::new(),
            rejection_text: None,
        }
    }

    fn error(kind: ErrorKind, message: String) -> Self {
        Self {
            status: TurnStatus::Error,
            error_detail: Some(ErrorDetail::new(kind, message)),
            metadata: TurnMetadata::new(),
            rejection_text: None,
        }
    }
}

fn cancellation_message(plan_label: Option<&str>) -> String {
    match plan_label {
        Some(plan) => format!("Request cancelled ({} plan).", plan),
        None => "Request cancelled.".to_string(),
    }
}

fn throttle_message(noun: &str, retry_after_secs: Option<u64>, omit_estimate: bool) -> String {
    match retry_after_secs {
        Some(secs) if !omit_estimate => {
            format!("{} reached. Please try again in {} seconds.", noun, secs)
        }
        _ => format!("{} reached. Please try again later.", noun),
    }
}

/// Classify a terminal fetch result.
///
/// Every kind in the closed set maps to exactly one outcome; the match is
/// exhaustive so a new transport kind fails to compile rather than being
/// silently mishandled. `InvalidStatefulMarker` must never reach this
/// function and returns a contract error.
pub fn classify(result: &FetchResult, options: &ClassifyOptions) -> Result<Classification> {
    let classification = match result {
        FetchResult::Success {
            request_id,
            text,
            tool_calls,
        } => {
            if text.is_empty() && tool_calls.is_empty() {
                Classification::error(
                    ErrorKind::EmptyResponse,
                    format!(
                        "The model returned no response (request id: {})",
                        request_id
                    ),
                )
            } else {
                Classification::status_only(TurnStatus::Success)
            }
        }

        FetchResult::OffTopic { .. } => Classification {
            status: TurnStatus::OffTopic,
            error_detail: None,
            metadata: TurnMetadata::new(),
            rejection_text: Some(options.off_topic_message.clone()),
        },

        FetchResult::Canceled { .. } => {
            let kind = match options.cancel_origin {
                CancelOrigin::User => ErrorKind::UserCancellation,
                CancelOrigin::Tool => ErrorKind::ToolCancellation,
            };
            Classification {
                status: TurnStatus::Cancelled,
                error_detail: Some(ErrorDetail::new(
                    kind,
                    cancellation_message(options.plan_label.as_deref()),
                )),
                metadata: TurnMetadata::new(),
                rejection_text: None,
            }
        }

        FetchResult::QuotaExceeded {
            retry_after_secs, ..
        } => Classification::error(
            ErrorKind::Transport,
            throttle_message(
                "Usage quota",
                *retry_after_secs,
                options.omit_rate_limit_estimate,
            ),
        ),

        FetchResult::RateLimited {
            retry_after_secs, ..
        } => Classification::error(
            ErrorKind::Transport,
            throttle_message(
                "Rate limit",
                *retry_after_secs,
                options.omit_rate_limit_estimate,
            ),
        ),

        FetchResult::Filtered { category, .. } => {
            let mut metadata = TurnMetadata::new();
            metadata.insert(keys::FILTER_CATEGORY, category.as_str());
            Classification {
                status: TurnStatus::Filtered,
                error_detail: None,
                metadata,
                rejection_text: None,
            }
        }

        FetchResult::PromptFiltered { .. } => {
            let mut metadata = TurnMetadata::new();
            metadata.insert(keys::FILTER_CATEGORY, "prompt");
            Classification {
                status: TurnStatus::PromptFiltered,
                error_detail: None,
                metadata,
                rejection_text: None,
            }
        }

        // Unauthorized turns carry no error detail; the status alone is
        // surfaced. Flagged for product review rather than changed here.
        FetchResult::AgentUnauthorized { .. } => Classification::status_only(TurnStatus::Error),

        FetchResult::BadRequest {
            request_id,
            message,
        } => Classification::error(
            ErrorKind::Transport,
            format!("Bad request: {} (request id: {})", message, request_id),
        ),

        FetchResult::NetworkError {
            request_id,
            message,
        } => Classification::error(
            ErrorKind::Transport,
            format!("Network error: {} (request id: {})", message, request_id),
        ),

        FetchResult::Failed {
            request_id,
            message,
        } => Classification::error(
            ErrorKind::Transport,
            format!("Request failed: {} (request id: {})", message, request_id),
        ),

        FetchResult::AgentFailedDependency {
            request_id,
            message,
        } => Classification::error(
            ErrorKind::Transport,
            format!(
                "An upstream dependency failed: {} (request id: {})",
                message, request_id
            ),
        ),

        FetchResult::Length { request_id, .. } => Classification::error(
            ErrorKind::Transport,
            format!(
                "The response hit the length limit (request id: {})",
                request_id
            ),
        ),

        // NotFound and Unknown keep identical handling so existing clients
        // see the same message for both.
        FetchResult::NotFound {
            request_id,
            message,
        }
        | FetchResult::Unknown {
            request_id,
            message,
        } => Classification::error(
            ErrorKind::Transport,
            format!("Request failed: {} (request id: {})", message, request_id),
        ),

        FetchResult::ExtensionBlocked {
            request_id,
            message,
        } => Classification::error(
            ErrorKind::Transport,
            format!(
                "A required extension blocked the request: {} (request id: {})",
                message, request_id
            ),
        ),

        FetchResult::InvalidStatefulMarker { request_id } => {
            return Err(LoopError::Contract(format!(
                "invalid stateful marker reached the classifier (request id: {})",
                request_id
            )));
        }
    };

    Ok(classification)
}

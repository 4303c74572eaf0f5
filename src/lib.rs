// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Turnloop - the request/response core of a conversational coding assistant.
//!
//! One user turn is driven by the tool-calling loop in `engine`: build a
//! prompt, fetch a model response over the `fetch` transport seam, execute
//! the tool calls the model requested, and iterate until the model answers
//! without tools or something terminal happens.
//!
//! Architecture highlights:
//! - `engine`: the tool-calling loop, pause/cancellation signals, and the
//!   continuation confirmation gate
//! - `fetch`: the transport seam, the closed set of terminal fetch results,
//!   and a scriptable mock transport
//! - `classify`: pure mapping from a terminal fetch result to a turn status,
//!   error detail, and metadata
//! - `prompt`, `tools`: construction and execution seams owned by the host
//! - `stream`: typed output parts and the observing adapter pipeline
//! - `turn`: turn, round, and tool-result state
//! - `handler`: the outermost per-turn surface; always yields a `ChatResult`
//! - `telemetry`: terminal and sampling telemetry events

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod handler;
pub mod prompt;
pub mod stream;
pub mod telemetry;
pub mod tools;
pub mod turn;

pub use error::{LoopError, Result};

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Response stream pipeline
//!
//! A stack of [`StreamObserver`] adapters wraps the raw output sink. Every
//! adapter sees every part; an adapter may rewrite text content but must
//! never change a part's type. Adapters run in a fixed order: link
//! rewriting first, then edit tracking, then usage aggregation, because the
//! usage collector's aggregates must include what earlier adapters produced.
//! Disabled adapters stay in the stack as no-ops. When the stream completes,
//! each adapter's `finalize` flushes collected state onto the turn.

use regex::Regex;

use crate::config::LoopConfig;
use crate::stream::{OutputPart, OutputSink};
use crate::turn::{keys, Turn};

/// An ordered participant in the response stream.
pub trait StreamObserver: Send {
    /// Adapter name, for logging
    fn name(&self) -> &'static str;

    /// Whether this adapter participates. Disabled adapters remain in the
    /// stack but observe nothing.
    fn enabled(&self) -> bool {
        true
    }

    /// Observe one part, optionally rewriting its content. The part type
    /// must be preserved.
    fn observe(&mut self, part: OutputPart) -> OutputPart {
        part
    }

    /// Flush collected state onto the turn when the stream completes
    fn finalize(&mut self, _turn: &mut Turn) {}
}

/// The composed response stream: adapters in fixed order, then the raw sink.
pub struct ResponsePipeline {
    sink: Box<dyn OutputSink>,
    observers: Vec<Box<dyn StreamObserver>>,
    finished: bool,
}

impl ResponsePipeline {
    /// Compose the standard adapter stack over a sink.
    pub fn standard(sink: Box<dyn OutputSink>, config: &LoopConfig) -> Self {
        Self::with_observers(
            sink,
            vec![
                Box::new(LinkRewriter::new(config.linkify)),
                Box::new(EditSurvivalTracker::new()),
                Box::new(UsageCollector::new()),
            ],
        )
    }

    /// Compose a custom adapter stack over a sink
    pub fn with_observers(
        sink: Box<dyn OutputSink>,
        observers: Vec<Box<dyn StreamObserver>>,
    ) -> Self {
        Self {
            sink,
            observers,
            finished: false,
        }
    }

    /// Run every adapter's finalize action, in stack order. Idempotent.
    pub fn finish(&mut self, turn: &mut Turn) {
        if self.finished {
            return;
        }
        self.finished = true;
        for observer in &mut self.observers {
            tracing::debug!(
                target: "turnloop.stream",
                adapter = observer.name(),
                enabled = observer.enabled(),
                "finalizing stream adapter"
            );
            observer.finalize(turn);
        }
    }

    /// Take back the underlying sink, consuming the pipeline
    pub fn into_sink(self) -> Box<dyn OutputSink> {
        self.sink
    }
}

impl OutputSink for ResponsePipeline {
    fn push(&mut self, mut part: OutputPart) {
        for observer in &mut self.observers {
            if !observer.enabled() {
                continue;
            }
            let kind = part.kind();
            part = observer.observe(part);
            debug_assert_eq!(
                part.kind(),
                kind,
                "stream adapter {} changed the part type",
                observer.name()
            );
        }
        self.sink.push(part);
    }
}

/// Rewrites bare workspace-relative paths in text parts into markdown links.
pub struct LinkRewriter {
    enabled: bool,
    pattern: Regex,
    rewritten: usize,
}

impl LinkRewriter {
    /// Create a rewriter; `enabled` comes from configuration
    pub fn new(enabled: bool) -> Self {
        // Paths under common workspace roots, preceded by start-of-text or
        // whitespace so paths already inside markdown links are left alone.
        let pattern = Regex::new(r"(^|\s)((?:src|tests|docs|crates)/[\w\-./]+\.\w+)").unwrap();
        Self {
            enabled,
            pattern,
            rewritten: 0,
        }
    }
}

impl StreamObserver for LinkRewriter {
    fn name(&self) -> &'static str {
        "link_rewriter"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn observe(&mut self, part: OutputPart) -> OutputPart {
        match part {
            OutputPart::Text { text } => {
                let rewritten = self.pattern.replace_all(&text, "$1[$2]($2)");
                if rewritten != text {
                    self.rewritten += 1;
                }
                OutputPart::Text {
                    text: rewritten.into_owned(),
                }
            }
            other => other,
        }
    }

    fn finalize(&mut self, _turn: &mut Turn) {
        if self.rewritten > 0 {
            tracing::debug!(
                target: "turnloop.stream",
                parts_rewritten = self.rewritten,
                "link rewriter done"
            );
        }
    }
}

/// Collects the paths touched by edit parts.
#[derive(Default)]
pub struct EditSurvivalTracker {
    edited: Vec<String>,
}

impl EditSurvivalTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamObserver for EditSurvivalTracker {
    fn name(&self) -> &'static str {
        "edit_survival"
    }

    fn observe(&mut self, part: OutputPart) -> OutputPart {
        if let OutputPart::Edit { path, .. } = &part {
            if !self.edited.iter().any(|p| p == path) {
                self.edited.push(path.clone());
            }
        }
        part
    }

    fn finalize(&mut self, turn: &mut Turn) {
        if !self.edited.is_empty() {
            turn.metadata
                .insert(keys::EDITED_FILES, serde_json::json!(self.edited));
        }
    }
}

/// Aggregates stream volume: part count and text characters.
#[derive(Default)]
pub struct UsageCollector {
    parts: usize,
    chars: usize,
}

impl UsageCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamObserver for UsageCollector {
    fn name(&self) -> &'static str {
        "usage_collector"
    }

    fn observe(&mut self, part: OutputPart) -> OutputPart {
        self.parts += 1;
        if let OutputPart::Text { text } = &part {
            self.chars += text.len();
        }
        part
    }

    fn finalize(&mut self, turn: &mut Turn) {
        turn.metadata.insert(keys::STREAM_PARTS, self.parts);
        turn.metadata.insert(keys::STREAM_CHARS, self.chars);
        tracing::debug!(
            target: "turnloop.stream",
            stream_parts = self.parts,
            stream_chars = self.chars,
            "stream usage collected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink that shares its captured parts with the test body.
    struct SharedSink(Arc<Mutex<Vec<OutputPart>>>);

    impl OutputSink for SharedSink {
        fn push(&mut self, part: OutputPart) {
            if let Ok(mut parts) = self.0.lock() {
                parts.push(part);
            }
        }
    }

    fn shared_pipeline(config: &LoopConfig) -> (ResponsePipeline, Arc<Mutex<Vec<OutputPart>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let pipeline =
            ResponsePipeline::standard(Box::new(SharedSink(Arc::clone(&captured))), config);
        (pipeline, captured)
    }

    // ===== Pipeline composition =====

    #[test]
    fn test_parts_reach_the_sink_in_order() {
        let (mut pipeline, captured) = shared_pipeline(&LoopConfig::default());
        pipeline.push(OutputPart::text("one"));
        pipeline.push(OutputPart::progress("two"));

        let parts = captured.lock().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].kind(), "text");
        assert_eq!(parts[1].kind(), "progress");
    }

    #[test]
    fn test_finalize_flushes_usage_metadata() {
        let (mut pipeline, _captured) = shared_pipeline(&LoopConfig::default());
        pipeline.push(OutputPart::text("hello"));
        pipeline.push(OutputPart::text(" world"));

        let mut turn = Turn::new("req");
        pipeline.finish(&mut turn);

        assert_eq!(
            turn.metadata.get(keys::STREAM_PARTS).and_then(|v| v.as_u64()),
            Some(2)
        );
        assert_eq!(
            turn.metadata.get(keys::STREAM_CHARS).and_then(|v| v.as_u64()),
            Some(11)
        );
    }

    #[test]
    fn test_finish_is_idempotent() {
        let (mut pipeline, _captured) = shared_pipeline(&LoopConfig::default());
        pipeline.push(OutputPart::text("x"));

        let mut turn = Turn::new("req");
        pipeline.finish(&mut turn);
        pipeline.push(OutputPart::text("late"));
        pipeline.finish(&mut turn);

        // Metadata reflects the first finalize only.
        assert_eq!(
            turn.metadata.get(keys::STREAM_PARTS).and_then(|v| v.as_u64()),
            Some(1)
        );
    }

    // ===== Link rewriter =====

    #[test]
    fn test_link_rewriter_rewrites_workspace_paths() {
        let mut rewriter = LinkRewriter::new(true);
        let part = rewriter.observe(OutputPart::text("see src/engine/mod.rs for details"));
        if let OutputPart::Text { text } = part {
            assert!(text.contains("[src/engine/mod.rs](src/engine/mod.rs)"));
        } else {
            panic!("expected text part");
        }
    }

    #[test]
    fn test_link_rewriter_disabled_is_structural_noop() {
        let config = LoopConfig::default().with_linkify(false);
        let (mut pipeline, captured) = shared_pipeline(&config);
        pipeline.push(OutputPart::text("see src/lib.rs here"));

        let parts = captured.lock().unwrap();
        assert_eq!(
            parts[0],
            OutputPart::text("see src/lib.rs here"),
            "disabled rewriter must not touch the text"
        );
    }

    #[test]
    fn test_link_rewriter_leaves_existing_links_alone() {
        let mut rewriter = LinkRewriter::new(true);
        let original = "already [src/lib.rs](src/lib.rs) linked";
        let part = rewriter.observe(OutputPart::text(original));
        if let OutputPart::Text { text } = part {
            assert_eq!(text, original);
        } else {
            panic!("expected text part");
        }
    }

    // ===== Edit tracker =====

    #[test]
    fn test_edit_tracker_collects_paths() {
        let (mut pipeline, _captured) = shared_pipeline(&LoopConfig::default());
        pipeline.push(OutputPart::Edit {
            path: "src/a.rs".to_string(),
            description: "fix".to_string(),
        });
        pipeline.push(OutputPart::Edit {
            path: "src/a.rs".to_string(),
            description: "fix again".to_string(),
        });
        pipeline.push(OutputPart::Edit {
            path: "src/b.rs".to_string(),
            description: "new".to_string(),
        });

        let mut turn = Turn::new("req");
        pipeline.finish(&mut turn);

        let edited = turn.metadata.get(keys::EDITED_FILES).unwrap();
        assert_eq!(edited, &serde_json::json!(["src/a.rs", "src/b.rs"]));
    }

    #[test]
    fn test_no_edits_leaves_metadata_unset() {
        let (mut pipeline, _captured) = shared_pipeline(&LoopConfig::default());
        pipeline.push(OutputPart::text("no edits here"));

        let mut turn = Turn::new("req");
        pipeline.finish(&mut turn);
        assert!(turn.metadata.get(keys::EDITED_FILES).is_none());
    }

    // ===== VecSink passthrough =====

    #[test]
    fn test_custom_observer_stack() {
        struct Upcase;
        impl StreamObserver for Upcase {
            fn name(&self) -> &'static str {
                "upcase"
            }
            fn observe(&mut self, part: OutputPart) -> OutputPart {
                match part {
                    OutputPart::Text { text } => OutputPart::Text {
                        text: text.to_uppercase(),
                    },
                    other => other,
                }
            }
        }

        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = ResponsePipeline::with_observers(
            Box::new(SharedSink(Arc::clone(&captured))),
            vec![Box::new(Upcase)],
        );
        pipeline.push(OutputPart::text("hello"));

        let parts = captured.lock().unwrap();
        assert_eq!(parts[0], OutputPart::text("HELLO"));
    }
}

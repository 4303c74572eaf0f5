// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Pause and cancellation signals
//!
//! Both signals are watch-channel backed, so waiting never busy-spins.
//! The [`PauseController`] folds them into a single awaitable condition,
//! "not paused and not cancelled", with cancellation winning over pause.

use tokio::sync::watch;

/// Requests cancellation of a turn.
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

/// Observes a cancellation request. Cheap to clone.
#[derive(Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSource {
    /// Create a source and its signal
    pub fn new() -> (Self, CancellationSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancellationSignal { rx })
    }

    /// Fire the cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancellationSignal { rx }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until cancellation is requested. Never returns if the source
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// Outcome of waiting at the pause gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Not paused and not cancelled; the loop may proceed
    Ready,
    /// Cancellation fired while waiting
    Cancelled,
}

/// Flips the external pause signal.
pub struct PauseHandle {
    tx: watch::Sender<bool>,
}

impl PauseHandle {
    /// Pause loop progress
    pub fn pause(&self) {
        let _ = self.tx.send(true);
    }

    /// Resume loop progress
    pub fn resume(&self) {
        let _ = self.tx.send(false);
    }

    /// Set the pause state directly
    pub fn set_paused(&self, paused: bool) {
        let _ = self.tx.send(paused);
    }
}

/// Gates loop progress on the external pause signal.
pub struct PauseController {
    rx: watch::Receiver<bool>,
}

impl PauseController {
    /// Create a handle/controller pair
    pub fn new() -> (PauseHandle, PauseController) {
        let (tx, rx) = watch::channel(false);
        (PauseHandle { tx }, PauseController { rx })
    }

    /// A controller that is never paused
    pub fn unpaused() -> Self {
        let (_tx, rx) = watch::channel(false);
        PauseController { rx }
    }

    /// Whether the loop is currently paused
    pub fn is_paused(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until the loop is neither paused nor cancelled.
    /// Cancellation wins over pause. A dropped pause handle counts as
    /// resumed, so a paused loop is never stranded.
    pub async fn wait_until_active(&mut self, cancel: &CancellationSignal) -> GateOutcome {
        loop {
            if cancel.is_cancelled() {
                return GateOutcome::Cancelled;
            }
            if !*self.rx.borrow_and_update() {
                return GateOutcome::Ready;
            }
            tracing::debug!(target: "turnloop.engine", "loop paused; waiting for resume");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return GateOutcome::Cancelled,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return if cancel.is_cancelled() {
                            GateOutcome::Cancelled
                        } else {
                            GateOutcome::Ready
                        };
                    }
                }
            }
        }
    }
}

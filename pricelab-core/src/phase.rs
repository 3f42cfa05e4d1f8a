//! Run lifecycle state machine.
//!
//! ```text
//! Init → (Loading ⇄ Validating ⇄ Buffering) → Flushing → [Revoking] → … → Done
//!                                                                     ↘ Failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Loading,
    Validating,
    Buffering,
    Flushing,
    Revoking,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    /// Whether `self → next` is a legal step.
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        if self == next {
            return !self.is_terminal();
        }
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Init, Loading) => true,
            (Loading | Validating | Buffering, Loading | Validating | Buffering) => true,
            (Loading | Validating | Buffering, Flushing) => true,
            (Flushing, Revoking) => true,
            (Flushing | Revoking, Loading | Buffering | Done) => true,
            (Loading | Validating | Buffering, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::Loading => "loading",
            RunPhase::Validating => "validating",
            RunPhase::Buffering => "buffering",
            RunPhase::Flushing => "flushing",
            RunPhase::Revoking => "revoking",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current phase of one run.
#[derive(Debug)]
pub struct PhaseTracker {
    current: RunPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: RunPhase::Init,
        }
    }

    pub fn current(&self) -> RunPhase {
        self.current
    }

    /// Move to `next`. Illegal steps are logged and ignored.
    pub fn advance(&mut self, next: RunPhase) {
        if self.current == next {
            return;
        }
        if !self.current.can_advance_to(next) {
            error!(from = %self.current, to = %next, "illegal run phase transition");
            return;
        }
        trace!(from = %self.current, to = %next, "run phase");
        self.current = next;
    }
}

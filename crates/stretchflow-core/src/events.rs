use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::session::{Phase, Step};

/// Every state change in a session produces an Event.
/// Display adapters subscribe to all of them; narration and streak
/// recording each react to their own subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A step became active (session start, rest expiry, skip, restart).
    StepEntered { step_index: usize, step: Step },
    /// One clock tick was applied.
    Tick { seconds_remaining: u32, phase: Phase },
    /// The active step crossed its midpoint.
    HalfwayOrSwitch { step_index: usize, unilateral: bool },
    /// The active step ran out and a rest follows.
    StepFinished { step_index: usize },
    /// Rest began; `next_step` is what comes after it.
    RestStarted {
        next_index: usize,
        next_step: Step,
        rest_seconds: u32,
    },
    /// The last step ran out.
    RoutineFinished {
        step_count: usize,
        elapsed_total_seconds: u64,
    },
    Paused {
        seconds_remaining: u32,
        elapsed_total_seconds: u64,
    },
    Resumed { seconds_remaining: u32 },
    SessionRestarted,
    /// Free narration ran out; the session continues silently.
    VoiceQuotaExhausted,
    /// The streak write for this completion has been persisted.
    CompletionRecorded { streak: u32, date: NaiveDate },
    /// The streak write failed; the routine still counts as finished.
    CompletionFailed { reason: String },
}

impl SessionEvent {
    /// Events the narration coordinator reacts to.
    pub fn is_narrated(&self) -> bool {
        matches!(
            self,
            SessionEvent::StepEntered { .. }
                | SessionEvent::HalfwayOrSwitch { .. }
                | SessionEvent::RestStarted { .. }
                | SessionEvent::RoutineFinished { .. }
        )
    }
}

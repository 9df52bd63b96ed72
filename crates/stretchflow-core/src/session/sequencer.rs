//! Step sequencer implementation.
//!
//! The sequencer is a pure, tick-driven state machine. It owns no clock and
//! no threads: the caller feeds it one `tick()` per elapsed second and user
//! commands in between, and gets back the events each input produced.
//!
//! ## State Transitions
//!
//! ```text
//! Active(0) -> Resting(0) -> Active(1) -> ... -> Active(N-1) -> Finished
//!     ^                                                            |
//!     +---------------------------- restart -----------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut seq = Sequencer::new(routine)?;
//! let opening = seq.start(); // StepEntered for step 0
//! // Once per second while not paused:
//! for event in seq.tick() { /* fan out */ }
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::routine::{Routine, Step};
use crate::error::ValidationError;
use crate::events::SessionEvent;

/// Fixed rest between consecutive steps, in seconds.
pub const DEFAULT_REST_SECONDS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Active,
    /// Resting after `current_step_index`.
    Resting,
    Finished,
}

/// Mutable session state. Created at session start, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub current_step_index: usize,
    pub phase: Phase,
    pub seconds_remaining: u32,
    pub paused: bool,
    /// Halfway cue already emitted for the current step.
    pub has_announced_switch: bool,
    pub elapsed_total_seconds: u64,
}

impl SessionState {
    fn initial(routine: &Routine) -> Self {
        Self {
            current_step_index: 0,
            phase: Phase::Active,
            seconds_remaining: routine
                .steps
                .first()
                .map(|s| s.duration_seconds)
                .unwrap_or(0),
            paused: false,
            has_announced_switch: false,
            elapsed_total_seconds: 0,
        }
    }
}

/// Point-in-time view for display adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub step_name: String,
    pub next_step_name: Option<String>,
    pub step_count: usize,
    /// 0.0 .. 1.0 within the current step or rest.
    pub phase_progress: f64,
    /// 0.0 .. 100.0 across the routine's step time.
    pub routine_progress_pct: f64,
}

#[derive(Debug, Clone)]
pub struct Sequencer {
    routine: Routine,
    state: SessionState,
    rest_seconds: u32,
}

impl Sequencer {
    /// Create a sequencer positioned on the first step.
    ///
    /// # Errors
    /// Rejects routines with no steps or a zero-length step.
    pub fn new(routine: Routine) -> Result<Self, ValidationError> {
        routine.validate()?;
        let state = SessionState::initial(&routine);
        Ok(Self {
            routine,
            state,
            rest_seconds: DEFAULT_REST_SECONDS,
        })
    }

    /// Override the rest length. A rest always lasts at least one tick.
    pub fn with_rest_seconds(mut self, rest_seconds: u32) -> Self {
        self.rest_seconds = rest_seconds.max(1);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn step_index(&self) -> usize {
        self.state.current_step_index
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.state.seconds_remaining
    }

    pub fn elapsed_total_seconds(&self) -> u64 {
        self.state.elapsed_total_seconds
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn is_finished(&self) -> bool {
        self.state.phase == Phase::Finished
    }

    /// True when ticks would change state, i.e. the clock should be running.
    pub fn is_ticking(&self) -> bool {
        !self.state.paused && self.state.phase != Phase::Finished
    }

    pub fn rest_seconds(&self) -> u32 {
        self.rest_seconds
    }

    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.routine.steps.get(self.state.current_step_index)
    }

    pub fn next_step(&self) -> Option<&Step> {
        self.routine.steps.get(self.state.current_step_index + 1)
    }

    /// 0.0 .. 1.0 progress within the current step (or rest).
    pub fn phase_progress(&self) -> f64 {
        let total = match self.state.phase {
            Phase::Active => self.current_step().map(|s| s.duration_seconds).unwrap_or(0),
            Phase::Resting => self.rest_seconds,
            Phase::Finished => return 1.0,
        };
        if total == 0 {
            return 0.0;
        }
        1.0 - (f64::from(self.state.seconds_remaining) / f64::from(total))
    }

    /// 0.0 .. 100.0 progress across the routine's step time. Rests count as
    /// the completed step they follow.
    pub fn routine_progress_pct(&self) -> f64 {
        if self.is_finished() {
            return 100.0;
        }
        let total = self.routine.total_step_seconds() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let index = self.state.current_step_index;
        let current = self
            .current_step()
            .map(|s| f64::from(s.duration_seconds))
            .unwrap_or(0.0);
        let done = self.routine.cumulative_seconds(index) as f64
            + match self.state.phase {
                Phase::Active => current * self.phase_progress(),
                _ => current,
            };
        (done / total * 100.0).min(100.0)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            step_name: self.current_step().map(|s| s.name.clone()).unwrap_or_default(),
            next_step_name: self.next_step().map(|s| s.name.clone()),
            step_count: self.routine.step_count(),
            phase_progress: self.phase_progress(),
            routine_progress_pct: self.routine_progress_pct(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Announce the step the session opens on. Call once when the session
    /// begins so the first step is narrated like every later one.
    pub fn start(&self) -> Vec<SessionEvent> {
        self.step_entered().into_iter().collect()
    }

    /// Apply one elapsed second.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        if !self.is_ticking() {
            return Vec::new();
        }

        self.state.seconds_remaining = self.state.seconds_remaining.saturating_sub(1);
        self.state.elapsed_total_seconds += 1;

        let mut events = vec![SessionEvent::Tick {
            seconds_remaining: self.state.seconds_remaining,
            phase: self.state.phase,
        }];

        match self.state.phase {
            Phase::Active => {
                let index = self.state.current_step_index;
                if let Some(step) = self.routine.steps.get(index) {
                    if !self.state.has_announced_switch
                        && self.state.seconds_remaining <= step.halfway_mark()
                    {
                        self.state.has_announced_switch = true;
                        events.push(SessionEvent::HalfwayOrSwitch {
                            step_index: index,
                            unilateral: step.unilateral,
                        });
                    }
                }
                if self.state.seconds_remaining == 0 {
                    events.extend(self.finish_step());
                }
            }
            Phase::Resting => {
                if self.state.seconds_remaining == 0 {
                    events.extend(self.enter_step(self.state.current_step_index + 1));
                }
            }
            Phase::Finished => {}
        }

        events
    }

    pub fn pause(&mut self) -> Vec<SessionEvent> {
        if self.state.paused || self.is_finished() {
            return Vec::new();
        }
        self.state.paused = true;
        debug!(
            step_index = self.state.current_step_index,
            seconds_remaining = self.state.seconds_remaining,
            "session paused"
        );
        vec![SessionEvent::Paused {
            seconds_remaining: self.state.seconds_remaining,
            elapsed_total_seconds: self.state.elapsed_total_seconds,
        }]
    }

    pub fn resume(&mut self) -> Vec<SessionEvent> {
        if !self.state.paused {
            return Vec::new();
        }
        self.state.paused = false;
        debug!(step_index = self.state.current_step_index, "session resumed");
        vec![SessionEvent::Resumed {
            seconds_remaining: self.state.seconds_remaining,
        }]
    }

    pub fn toggle_pause(&mut self) -> Vec<SessionEvent> {
        if self.state.paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Jump to the next step, bypassing any rest. Active phase only.
    pub fn skip_forward(&mut self) -> Vec<SessionEvent> {
        let next = self.state.current_step_index + 1;
        if self.state.phase != Phase::Active || next >= self.routine.steps.len() {
            return Vec::new();
        }
        self.enter_step(next)
    }

    /// Jump back one step. Active phase only.
    pub fn skip_backward(&mut self) -> Vec<SessionEvent> {
        let index = self.state.current_step_index;
        if self.state.phase != Phase::Active || index == 0 {
            return Vec::new();
        }
        self.enter_step(index - 1)
    }

    /// End the current rest early, exactly as if it had expired.
    pub fn skip_rest(&mut self) -> Vec<SessionEvent> {
        if self.state.phase != Phase::Resting {
            return Vec::new();
        }
        self.enter_step(self.state.current_step_index + 1)
    }

    /// Start the routine over. Only valid once finished.
    pub fn restart(&mut self) -> Vec<SessionEvent> {
        if !self.is_finished() {
            return Vec::new();
        }
        self.state = SessionState::initial(&self.routine);
        info!(title = %self.routine.title, "session restarted");
        let mut events = vec![SessionEvent::SessionRestarted];
        events.extend(self.step_entered());
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn step_entered(&self) -> Option<SessionEvent> {
        let step = self.current_step()?;
        Some(SessionEvent::StepEntered {
            step_index: self.state.current_step_index,
            step: step.clone(),
        })
    }

    fn enter_step(&mut self, index: usize) -> Vec<SessionEvent> {
        let Some(step) = self.routine.steps.get(index) else {
            return Vec::new();
        };
        self.state.phase = Phase::Active;
        self.state.current_step_index = index;
        self.state.seconds_remaining = step.duration_seconds;
        self.state.has_announced_switch = false;
        debug!(step_index = index, step = %step.name, "step entered");
        self.step_entered().into_iter().collect()
    }

    fn finish_step(&mut self) -> Vec<SessionEvent> {
        let index = self.state.current_step_index;
        match self.routine.steps.get(index + 1) {
            Some(next) => {
                self.state.phase = Phase::Resting;
                self.state.seconds_remaining = self.rest_seconds;
                debug!(step_index = index, "step finished, resting");
                vec![
                    SessionEvent::StepFinished { step_index: index },
                    SessionEvent::RestStarted {
                        next_index: index + 1,
                        next_step: next.clone(),
                        rest_seconds: self.rest_seconds,
                    },
                ]
            }
            None => {
                self.state.phase = Phase::Finished;
                info!(
                    title = %self.routine.title,
                    elapsed_total_seconds = self.state.elapsed_total_seconds,
                    "routine finished"
                );
                vec![SessionEvent::RoutineFinished {
                    step_count: self.routine.step_count(),
                    elapsed_total_seconds: self.state.elapsed_total_seconds,
                }]
            }
        }
    }
}

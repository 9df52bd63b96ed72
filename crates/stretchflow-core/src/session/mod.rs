//! Routine model, the tick-driven sequencer, and the async runner around it.

mod clock;
mod routine;
mod runner;
mod sequencer;
mod summary;

pub use clock::{SessionClock, DEFAULT_TICK};
pub use routine::{Routine, Step};
pub use runner::{Session, SessionHandle, SessionOptions, SessionServices};
pub use sequencer::{Phase, Sequencer, SessionSnapshot, SessionState, DEFAULT_REST_SECONDS};
pub use summary::CompletionSummary;

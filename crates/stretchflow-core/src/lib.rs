//! # StretchFlow Core Library
//!
//! Core logic for guided stretching sessions. Everything here runs headless;
//! the `stretchflow-cli` binary and any GUI shell are thin layers over it.
//!
//! ## Architecture
//!
//! - **Sequencer**: a pure state machine advanced one second at a time by
//!   `tick()`; it never reads the clock itself
//! - **Session runner**: a tokio task that owns the clock, applies user
//!   commands and fans events out over a broadcast channel
//! - **Voice**: narration gated by a rolling weekly quota for free users
//! - **Profile**: calendar-day streaks persisted after each completion
//! - **Storage**: a key-value store trait with SQLite and in-memory backends,
//!   plus TOML configuration
//!
//! ## Key Components
//!
//! - [`Sequencer`]: step/rest state machine
//! - [`Session`] / [`SessionHandle`]: running session and its control surface
//! - [`QuotaGate`]: weekly voice allowance
//! - [`StreakRecorder`]: completion streaks
//! - [`Config`]: application configuration

pub mod error;
pub mod events;
pub mod premium;
pub mod profile;
pub mod session;
pub mod storage;
pub mod voice;

pub use error::{ConfigError, CoreError, SpeechError, StorageError, ValidationError};
pub use events::SessionEvent;
pub use premium::{FixedPremium, PremiumStatusProvider, StoredPremium};
pub use profile::{StreakRecorder, UserProfile};
pub use session::{
    CompletionSummary, Phase, Routine, Sequencer, Session, SessionHandle, SessionOptions,
    SessionServices, SessionSnapshot, SessionState, Step,
};
pub use storage::{Config, KeyValueStore, MemoryStore, SqliteStore};
pub use voice::{NarrationCoordinator, QuotaGate, SpeechBackend, SpeechOptions};

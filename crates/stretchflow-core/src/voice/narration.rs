//! Narration coordinator.
//!
//! The single subscriber that turns session events into spoken cues. It is
//! the only caller of the quota gate during a session, and it processes one
//! event at a time, so quota reads and writes never interleave.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::quota::QuotaGate;
use super::speech::{Haptics, NoopHaptics, SpeechBackend, SpeechOptions};
use crate::events::SessionEvent;
use crate::premium::PremiumStatusProvider;
use crate::session::Step;
use crate::storage::KeyValueStore;

/// Storage key for the user's silent-mode preference (`"true"`/`"false"`).
pub const SILENT_MODE_KEY: &str = "silent-mode";

pub const SWITCH_SIDES: &str = "Switch sides";
pub const HALFWAY_THERE: &str = "Halfway there";
pub const ROUTINE_COMPLETE: &str = "Routine complete. Great job!";

/// Spoken line for entering a step.
pub fn step_phrase(step: &Step) -> String {
    match step.instruction.as_deref().map(str::trim) {
        Some(instruction) if !instruction.is_empty() => format!("{}. {}", step.name, instruction),
        _ => format!("{}.", step.name),
    }
}

pub fn rest_phrase(rest_seconds: u32) -> String {
    format!("Rest for {rest_seconds} seconds")
}

pub struct NarrationCoordinator {
    quota: QuotaGate,
    premium: Arc<dyn PremiumStatusProvider>,
    speech: Arc<dyn SpeechBackend>,
    haptics: Arc<dyn Haptics>,
    preferences: Option<Arc<dyn KeyValueStore>>,
    options: SpeechOptions,
    /// User asked for silence.
    user_silent: bool,
    /// Quota ran out this session; cannot be undone until the next session.
    quota_silenced: bool,
    /// The current step's entry was narrated.
    step_granted: bool,
}

impl NarrationCoordinator {
    pub fn new(
        quota: QuotaGate,
        premium: Arc<dyn PremiumStatusProvider>,
        speech: Arc<dyn SpeechBackend>,
    ) -> Self {
        Self {
            quota,
            premium,
            speech,
            haptics: Arc::new(NoopHaptics),
            preferences: None,
            options: SpeechOptions::default(),
            user_silent: false,
            quota_silenced: false,
            step_granted: false,
        }
    }

    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    pub fn with_options(mut self, options: SpeechOptions) -> Self {
        self.options = options;
        self
    }

    /// Persist silent-mode changes to `store` and honour the saved value.
    pub fn with_preferences(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.preferences = Some(store);
        self
    }

    pub fn with_silent_mode(mut self, silent: bool) -> Self {
        self.user_silent = silent;
        self
    }

    /// Load the saved silent-mode preference. Unreadable means "not silent".
    pub async fn load_preferences(&mut self) {
        let Some(store) = &self.preferences else {
            return;
        };
        match store.get_item(SILENT_MODE_KEY).await {
            Ok(Some(value)) => self.user_silent = self.user_silent || value == "true",
            Ok(None) => {}
            Err(e) => warn!(error = %e, key = SILENT_MODE_KEY, "silent preference unreadable"),
        }
    }

    pub fn is_silenced(&self) -> bool {
        self.user_silent || self.quota_silenced
    }

    pub fn quota_exhausted(&self) -> bool {
        self.quota_silenced
    }

    /// Change the user's silent preference. Returns `false` when refused:
    /// voice cannot be re-enabled after the quota forced silence.
    pub async fn set_silent_mode(&mut self, enabled: bool) -> bool {
        if !enabled && self.quota_silenced {
            debug!("silent mode locked by exhausted voice quota");
            return false;
        }
        self.user_silent = enabled;
        if enabled {
            self.speech.stop();
        }
        if let Some(store) = &self.preferences {
            let value = if enabled { "true" } else { "false" };
            if let Err(e) = store.set_item(SILENT_MODE_KEY, value).await {
                warn!(error = %e, key = SILENT_MODE_KEY, "failed to save silent preference");
            }
        }
        true
    }

    /// React to one session event. Returns the quota-exhausted signal the
    /// first time narration is denied.
    pub async fn handle(&mut self, event: &SessionEvent) -> Option<SessionEvent> {
        match event {
            SessionEvent::StepEntered { step, .. } => self.on_step_entered(step).await,
            SessionEvent::HalfwayOrSwitch { unilateral, .. } => {
                self.haptics.pulse();
                if !self.is_silenced() && self.step_granted {
                    self.say(if *unilateral { SWITCH_SIDES } else { HALFWAY_THERE });
                }
                None
            }
            SessionEvent::RestStarted { rest_seconds, .. } => {
                if !self.is_silenced() {
                    self.say(&rest_phrase(*rest_seconds));
                }
                None
            }
            SessionEvent::RoutineFinished { .. } => {
                if !self.is_silenced() {
                    self.say(ROUTINE_COMPLETE);
                }
                None
            }
            _ => None,
        }
    }

    /// Cut off anything still playing.
    pub fn stop(&self) {
        self.speech.stop();
    }

    async fn on_step_entered(&mut self, step: &Step) -> Option<SessionEvent> {
        self.step_granted = false;
        if self.is_silenced() {
            return None;
        }

        let premium = self.premium.is_premium().await;
        if !self.quota.check_access(premium).await {
            self.quota_silenced = true;
            info!(limit = self.quota.limit(), "voice quota exhausted, continuing silently");
            return Some(SessionEvent::VoiceQuotaExhausted);
        }

        self.step_granted = true;
        self.say(&step_phrase(step));
        if !premium {
            if let Err(e) = self.quota.record_usage().await {
                warn!(error = %e, "failed to record voice usage");
            }
        }
        None
    }

    /// Speak `text`, superseding whatever is still playing.
    fn say(&self, text: &str) {
        self.speech.stop();
        if let Err(e) = self.speech.speak(text, &self.options) {
            warn!(error = %e, text, "utterance dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpeechError;
    use crate::premium::FixedPremium;
    use crate::storage::MemoryStore;
    use crate::voice::quota::QUOTA_KEY;
    use crate::voice::speech::{RecordingSpeech, SpeechCall};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHaptics(AtomicUsize);

    impl Haptics for CountingHaptics {
        fn pulse(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MuteBackend;

    impl SpeechBackend for MuteBackend {
        fn speak(&self, _text: &str, _options: &SpeechOptions) -> Result<(), SpeechError> {
            Err(SpeechError("no voices installed".into()))
        }
        fn stop(&self) {}
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        speech: Arc<RecordingSpeech>,
        haptics: Arc<CountingHaptics>,
        narrator: NarrationCoordinator,
    }

    fn fixture(premium: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let speech = Arc::new(RecordingSpeech::new());
        let haptics = Arc::new(CountingHaptics::default());
        let narrator = NarrationCoordinator::new(
            QuotaGate::new(store.clone()),
            Arc::new(FixedPremium(premium)),
            speech.clone(),
        )
        .with_haptics(haptics.clone())
        .with_preferences(store.clone());
        Fixture {
            store,
            speech,
            haptics,
            narrator,
        }
    }

    fn entered(index: usize, step: Step) -> SessionEvent {
        SessionEvent::StepEntered {
            step_index: index,
            step,
        }
    }

    async fn used_count(store: &MemoryStore) -> u32 {
        store
            .raw(QUOTA_KEY)
            .await
            .map(|raw| serde_json::from_str::<serde_json::Value>(&raw).unwrap()["usedCount"].as_u64().unwrap() as u32)
            .unwrap_or(0)
    }

    #[test]
    fn phrases() {
        let step = Step::new("Cat Cow", 30).with_instruction("Arch and round your back");
        assert_eq!(step_phrase(&step), "Cat Cow. Arch and round your back");
        assert_eq!(step_phrase(&Step::new("Child's Pose", 30)), "Child's Pose.");
        assert_eq!(rest_phrase(10), "Rest for 10 seconds");
    }

    #[tokio::test]
    async fn step_entry_speaks_and_charges_once() {
        let mut f = fixture(false);
        let step = Step::new("Neck Roll", 20).with_instruction("Slowly");
        assert_eq!(f.narrator.handle(&entered(0, step)).await, None);
        assert_eq!(f.speech.spoken(), vec!["Neck Roll. Slowly".to_string()]);
        assert_eq!(used_count(&f.store).await, 1);

        // Rest, halfway and finish lines are free.
        f.narrator
            .handle(&SessionEvent::HalfwayOrSwitch {
                step_index: 0,
                unilateral: false,
            })
            .await;
        f.narrator
            .handle(&SessionEvent::RestStarted {
                next_index: 1,
                next_step: Step::new("Next", 10),
                rest_seconds: 10,
            })
            .await;
        f.narrator
            .handle(&SessionEvent::RoutineFinished {
                step_count: 1,
                elapsed_total_seconds: 20,
            })
            .await;
        assert_eq!(used_count(&f.store).await, 1);
        assert_eq!(
            f.speech.spoken(),
            vec![
                "Neck Roll. Slowly".to_string(),
                HALFWAY_THERE.to_string(),
                "Rest for 10 seconds".to_string(),
                ROUTINE_COMPLETE.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn each_utterance_supersedes_the_previous() {
        let mut f = fixture(true);
        f.narrator.handle(&entered(0, Step::new("A", 10))).await;
        f.narrator
            .handle(&SessionEvent::HalfwayOrSwitch {
                step_index: 0,
                unilateral: true,
            })
            .await;
        assert_eq!(
            f.speech.calls(),
            vec![
                SpeechCall::Stop,
                SpeechCall::Speak("A.".into()),
                SpeechCall::Stop,
                SpeechCall::Speak(SWITCH_SIDES.into()),
            ]
        );
    }

    #[tokio::test]
    async fn premium_is_never_charged() {
        let mut f = fixture(true);
        for i in 0..6 {
            f.narrator.handle(&entered(i, Step::new("S", 10))).await;
        }
        assert_eq!(f.speech.spoken().len(), 6);
        assert_eq!(f.store.raw(QUOTA_KEY).await, None);
    }

    #[tokio::test]
    async fn fourth_step_is_denied_once_then_silent() {
        let mut f = fixture(false);
        for i in 0..3 {
            assert_eq!(f.narrator.handle(&entered(i, Step::new("S", 10))).await, None);
        }
        assert_eq!(
            f.narrator.handle(&entered(3, Step::new("S", 10))).await,
            Some(SessionEvent::VoiceQuotaExhausted)
        );
        assert!(f.narrator.quota_exhausted());
        assert_eq!(f.narrator.handle(&entered(4, Step::new("S", 10))).await, None);

        // Everything after the denial is silent, finish line included.
        f.narrator
            .handle(&SessionEvent::RoutineFinished {
                step_count: 5,
                elapsed_total_seconds: 90,
            })
            .await;
        assert_eq!(f.speech.spoken().len(), 3);
        assert_eq!(used_count(&f.store).await, 3);

        // The user cannot switch voice back on.
        assert!(!f.narrator.set_silent_mode(false).await);
        assert!(f.narrator.is_silenced());
    }

    #[tokio::test]
    async fn silent_mode_skips_speech_and_quota() {
        let mut f = fixture(false);
        assert!(f.narrator.set_silent_mode(true).await);
        assert_eq!(f.store.raw(SILENT_MODE_KEY).await.as_deref(), Some("true"));

        f.narrator.handle(&entered(0, Step::new("S", 10))).await;
        f.narrator
            .handle(&SessionEvent::HalfwayOrSwitch {
                step_index: 0,
                unilateral: true,
            })
            .await;
        assert!(f.speech.spoken().is_empty());
        assert_eq!(used_count(&f.store).await, 0);
        // Haptics still fire.
        assert_eq!(f.haptics.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn saved_preference_is_honoured() {
        let mut f = fixture(false);
        f.store.set_item(SILENT_MODE_KEY, "true").await.unwrap();
        f.narrator.load_preferences().await;
        assert!(f.narrator.is_silenced());

        assert!(f.narrator.set_silent_mode(false).await);
        assert_eq!(f.store.raw(SILENT_MODE_KEY).await.as_deref(), Some("false"));
        assert!(!f.narrator.is_silenced());
    }

    #[tokio::test]
    async fn halfway_needs_a_granted_step() {
        let mut f = fixture(false);
        f.narrator.set_silent_mode(true).await;
        f.narrator.handle(&entered(0, Step::new("S", 10))).await;
        f.narrator.set_silent_mode(false).await;
        f.narrator
            .handle(&SessionEvent::HalfwayOrSwitch {
                step_index: 0,
                unilateral: false,
            })
            .await;
        assert!(f.speech.spoken().is_empty());
    }

    #[tokio::test]
    async fn speech_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let mut narrator = NarrationCoordinator::new(
            QuotaGate::new(store.clone()),
            Arc::new(FixedPremium(false)),
            Arc::new(MuteBackend),
        );
        assert_eq!(narrator.handle(&entered(0, Step::new("S", 10))).await, None);
        assert!(!narrator.is_silenced());
        assert_eq!(used_count(&store).await, 1);
    }
}

//! Live session runner.
//!
//! Wraps the pure [`Sequencer`] in a tokio task that owns the session clock.
//! Commands and ticks are serialized through one `select!` loop, so the
//! sequencer never sees two inputs at once.
//!
//! ```text
//!  SessionHandle ──commands──▶ ┌──────────────┐ ──events──▶ broadcast subscribers
//!                              │ session task │ ──events──▶ narration worker ──▶ speech
//!  SessionClock ───ticks─────▶ └──────────────┘ ──finish──▶ streak write (spawned)
//! ```
//!
//! Neither narration nor persistence is awaited by the session task: ticks
//! keep flowing while the quota store or the speech engine is slow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::SessionClock;
use super::routine::Routine;
use super::sequencer::{Sequencer, SessionSnapshot};
use crate::error::CoreError;
use crate::events::SessionEvent;
use crate::premium::{PremiumStatusProvider, StoredPremium};
use crate::profile::StreakRecorder;
use crate::storage::{Config, KeyValueStore, VoiceConfig};
use crate::voice::{
    Haptics, NarrationCoordinator, NoopHaptics, QuotaGate, SpeechBackend, SpeechOptions,
};

const EVENT_CAPACITY: usize = 256;

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct SessionServices {
    pub store: Arc<dyn KeyValueStore>,
    pub speech: Arc<dyn SpeechBackend>,
    pub haptics: Arc<dyn Haptics>,
    pub premium: Arc<dyn PremiumStatusProvider>,
}

impl SessionServices {
    /// Services with no haptics and the premium flag read from `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, speech: Arc<dyn SpeechBackend>) -> Self {
        Self {
            premium: Arc::new(StoredPremium::new(Arc::clone(&store))),
            store,
            speech,
            haptics: Arc::new(NoopHaptics),
        }
    }

    pub fn with_premium(mut self, premium: Arc<dyn PremiumStatusProvider>) -> Self {
        self.premium = premium;
        self
    }

    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }
}

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub rest_seconds: u32,
    pub tick: Duration,
    pub voice: VoiceConfig,
    /// Start silent regardless of the saved preference.
    pub silent: bool,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rest_seconds: config.session.rest_seconds,
            tick: config.session.tick_period(),
            voice: config.voice.clone(),
            silent: false,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug)]
enum Command {
    Pause,
    Resume,
    TogglePause,
    SkipForward,
    SkipBackward,
    SkipRest,
    Restart,
    SetSilentMode(bool),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

#[derive(Debug)]
enum NarrationMsg {
    Event { generation: u64, event: SessionEvent },
    SetSilent(bool),
}

/// A validated session that has not started ticking yet.
///
/// Subscribe before [`start`](Session::start) to see the opening events.
pub struct Session {
    id: Uuid,
    sequencer: Sequencer,
    services: SessionServices,
    options: SessionOptions,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// # Errors
    /// Returns a validation error for routines without steps or with a
    /// zero-length step.
    pub fn new(
        routine: Routine,
        services: SessionServices,
        options: SessionOptions,
    ) -> Result<Self, CoreError> {
        let sequencer = Sequencer::new(routine)?.with_rest_seconds(options.rest_seconds);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            id: Uuid::new_v4(),
            sequencer,
            services,
            options,
            events,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Spawn the session and narration tasks. Must be called from within a
    /// tokio runtime.
    pub fn start(self) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (narration_tx, narration_rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));

        let narrator = NarrationCoordinator::new(
            QuotaGate::with_config(Arc::clone(&self.services.store), &self.options.voice),
            Arc::clone(&self.services.premium),
            Arc::clone(&self.services.speech),
        )
        .with_haptics(Arc::clone(&self.services.haptics))
        .with_options(SpeechOptions::from(&self.options.voice))
        .with_preferences(Arc::clone(&self.services.store))
        .with_silent_mode(self.options.silent);

        let narration_task = tokio::spawn(narration_worker(
            narrator,
            narration_rx,
            Arc::clone(&generation),
            self.events.clone(),
        ));

        let task = SessionTask {
            id: self.id,
            sequencer: self.sequencer,
            clock: SessionClock::new(self.options.tick),
            events: self.events.clone(),
            narration: narration_tx,
            generation,
            speech: Arc::clone(&self.services.speech),
            recorder: Arc::new(StreakRecorder::new(Arc::clone(&self.services.store))),
            pending_writes: Vec::new(),
        };
        let join = tokio::spawn(task.run(command_rx, narration_task));

        SessionHandle {
            id: self.id,
            commands: command_tx,
            events: self.events,
            task: Some(join),
        }
    }
}

/// Control surface for a running session.
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn pause(&self) -> Result<(), CoreError> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), CoreError> {
        self.send(Command::Resume)
    }

    pub fn toggle_pause(&self) -> Result<(), CoreError> {
        self.send(Command::TogglePause)
    }

    pub fn skip_forward(&self) -> Result<(), CoreError> {
        self.send(Command::SkipForward)
    }

    pub fn skip_backward(&self) -> Result<(), CoreError> {
        self.send(Command::SkipBackward)
    }

    pub fn skip_rest(&self) -> Result<(), CoreError> {
        self.send(Command::SkipRest)
    }

    pub fn restart(&self) -> Result<(), CoreError> {
        self.send(Command::Restart)
    }

    pub fn set_silent_mode(&self, enabled: bool) -> Result<(), CoreError> {
        self.send(Command::SetSilentMode(enabled))
    }

    /// Current sequencer state, after every command sent so far.
    ///
    /// # Errors
    /// Returns `SessionClosed` once the session has shut down.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| CoreError::SessionClosed)
    }

    /// Stop the clock, cut off speech and wait for pending completion writes.
    /// Idempotent.
    pub async fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(session = %self.id, error = %e, "session task ended abnormally");
            }
        }
    }

    fn send(&self, command: Command) -> Result<(), CoreError> {
        self.commands
            .send(command)
            .map_err(|_| CoreError::SessionClosed)
    }
}

struct SessionTask {
    id: Uuid,
    sequencer: Sequencer,
    clock: SessionClock,
    events: broadcast::Sender<SessionEvent>,
    narration: mpsc::UnboundedSender<NarrationMsg>,
    /// Bumped on restart so narration queued by the previous run is dropped.
    generation: Arc<AtomicU64>,
    speech: Arc<dyn SpeechBackend>,
    recorder: Arc<StreakRecorder>,
    pending_writes: Vec<JoinHandle<()>>,
}

impl SessionTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        narration_task: JoinHandle<()>,
    ) {
        info!(
            session = %self.id,
            title = %self.sequencer.routine().title,
            steps = self.sequencer.routine().step_count(),
            "session started"
        );
        let opening = self.sequencer.start();
        self.dispatch(opening);
        self.sync_clock();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                _ = self.clock.tick() => {
                    let events = self.sequencer.tick();
                    self.dispatch(events);
                    self.sync_clock();
                }
            }
        }

        self.clock.stop();
        if self.sequencer.is_finished() {
            // Let the closing line and pending quota writes land.
            drop(self.narration);
            let _ = narration_task.await;
        } else {
            narration_task.abort();
        }
        self.speech.stop();
        for write in self.pending_writes.drain(..) {
            let _ = write.await;
        }
        info!(
            session = %self.id,
            elapsed_total_seconds = self.sequencer.elapsed_total_seconds(),
            "session ended"
        );
    }

    fn apply(&mut self, command: Command) {
        debug!(session = %self.id, ?command, "command");
        let events = match command {
            Command::Pause => self.sequencer.pause(),
            Command::Resume => self.sequencer.resume(),
            Command::TogglePause => self.sequencer.toggle_pause(),
            Command::SkipForward => self.sequencer.skip_forward(),
            Command::SkipBackward => self.sequencer.skip_backward(),
            Command::SkipRest => self.sequencer.skip_rest(),
            Command::Restart => {
                let events = self.sequencer.restart();
                if !events.is_empty() {
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    self.speech.stop();
                }
                events
            }
            Command::SetSilentMode(enabled) => {
                let _ = self.narration.send(NarrationMsg::SetSilent(enabled));
                Vec::new()
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.sequencer.snapshot());
                Vec::new()
            }
            Command::Shutdown => Vec::new(),
        };
        self.dispatch(events);
        self.sync_clock();
    }

    fn sync_clock(&mut self) {
        self.clock.set_running(self.sequencer.is_ticking());
    }

    fn dispatch(&mut self, events: Vec<SessionEvent>) {
        let generation = self.generation.load(Ordering::SeqCst);
        for event in events {
            if event.is_narrated() {
                let _ = self.narration.send(NarrationMsg::Event {
                    generation,
                    event: event.clone(),
                });
            }
            if matches!(event, SessionEvent::RoutineFinished { .. }) {
                self.record_completion();
            }
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    fn record_completion(&mut self) {
        let recorder = Arc::clone(&self.recorder);
        let routine = self.sequencer.routine().clone();
        let events = self.events.clone();
        self.pending_writes.retain(|w| !w.is_finished());
        self.pending_writes.push(tokio::spawn(async move {
            match recorder.record_completion(&routine).await {
                Ok(record) => {
                    let _ = events.send(SessionEvent::CompletionRecorded {
                        streak: record.streak,
                        date: record.date,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "failed to record completion, streak unchanged");
                    let _ = events.send(SessionEvent::CompletionFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }));
    }
}

async fn narration_worker(
    mut narrator: NarrationCoordinator,
    mut inbox: mpsc::UnboundedReceiver<NarrationMsg>,
    generation: Arc<AtomicU64>,
    events: broadcast::Sender<SessionEvent>,
) {
    narrator.load_preferences().await;
    while let Some(message) = inbox.recv().await {
        match message {
            NarrationMsg::SetSilent(enabled) => {
                if !narrator.set_silent_mode(enabled).await {
                    debug!("voice stays off for the rest of this session");
                }
            }
            NarrationMsg::Event {
                generation: sent_in,
                event,
            } => {
                if sent_in != generation.load(Ordering::SeqCst) {
                    continue;
                }
                if let Some(signal) = narrator.handle(&event).await {
                    let _ = events.send(signal);
                }
            }
        }
    }
}

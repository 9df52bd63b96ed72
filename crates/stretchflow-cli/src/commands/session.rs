use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use stretchflow_core::premium::provider_from_config;
use stretchflow_core::{
    CompletionSummary, Config, FixedPremium, KeyValueStore, PremiumStatusProvider, Routine,
    Session, SessionEvent, SessionHandle, SessionOptions, SessionServices, SpeechBackend,
    SpeechError, SpeechOptions, SqliteStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run a routine live; events are printed as JSON lines
    ///
    /// Stdin commands: p (pause/resume), n (next), b (back), s (skip rest),
    /// r (restart), "silent on|off", q (quit).
    Run {
        /// Routine JSON file
        file: PathBuf,
        /// Treat the user as premium (no voice quota)
        #[arg(long)]
        premium: bool,
        /// Start with voice guidance off
        #[arg(long)]
        silent: bool,
        /// Milliseconds per tick (overrides session.tick_ms)
        #[arg(long)]
        tick_ms: Option<u64>,
    },
    /// Check that a routine file is runnable
    Validate {
        /// Routine JSON file
        file: PathBuf,
    },
}

/// Prints utterances to stderr so stdout stays machine-readable.
struct ConsoleSpeech;

impl SpeechBackend for ConsoleSpeech {
    fn speak(&self, text: &str, _options: &SpeechOptions) -> Result<(), SpeechError> {
        eprintln!("[voice] {text}");
        Ok(())
    }

    fn stop(&self) {}
}

#[derive(Debug, PartialEq)]
enum Control {
    TogglePause,
    Next,
    Back,
    SkipRest,
    Restart,
    Silent(bool),
    Quit,
}

fn parse_control(line: &str) -> Option<Control> {
    match line.trim() {
        "p" => Some(Control::TogglePause),
        "n" => Some(Control::Next),
        "b" => Some(Control::Back),
        "s" => Some(Control::SkipRest),
        "r" => Some(Control::Restart),
        "silent on" => Some(Control::Silent(true)),
        "silent off" => Some(Control::Silent(false)),
        "q" => Some(Control::Quit),
        _ => None,
    }
}

fn load_routine(path: &Path) -> Result<Routine, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let routine: Routine = serde_json::from_str(&content)?;
    routine.validate()?;
    Ok(routine)
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::Validate { file } => {
            let routine = load_routine(&file)?;
            println!(
                "ok: '{}' has {} steps, {}s planned",
                routine.title,
                routine.step_count(),
                routine.planned_seconds(Config::load()?.session.rest_seconds)
            );
            Ok(())
        }
        SessionAction::Run {
            file,
            premium,
            silent,
            tick_ms,
        } => {
            let routine = load_routine(&file)?;
            let config = Config::load()?;
            let mut options = SessionOptions::from_config(&config);
            options.silent = silent;
            if let Some(ms) = tick_ms {
                options.tick = Duration::from_millis(ms.max(1));
            }

            let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open()?);
            let provider: Arc<dyn PremiumStatusProvider> = if premium {
                Arc::new(FixedPremium(true))
            } else {
                provider_from_config(&config, Arc::clone(&store))
            };
            let services =
                SessionServices::new(store, Arc::new(ConsoleSpeech)).with_premium(provider);

            // A pending stdin read would otherwise hold up runtime shutdown.
            let runtime = super::runtime()?;
            let result = runtime.block_on(drive(routine, services, options));
            runtime.shutdown_background();
            result
        }
    }
}

async fn drive(
    routine: Routine,
    services: SessionServices,
    options: SessionOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::new(routine.clone(), services, options)?;
    let mut events = session.subscribe();
    let mut handle = session.start();

    let (control_tx, mut controls) = mpsc::unbounded_channel();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_control(&line) {
                Some(control) => {
                    if control_tx.send(control).is_err() {
                        break;
                    }
                }
                None => eprintln!("unknown command: {}", line.trim()),
            }
        }
    });

    let result = pump(&mut events, &mut controls, &handle, &routine).await;
    handle.shutdown().await;
    reader.abort();
    result
}

async fn pump(
    events: &mut broadcast::Receiver<SessionEvent>,
    controls: &mut mpsc::UnboundedReceiver<Control>,
    handle: &SessionHandle,
    routine: &Routine,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut elapsed = 0;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    match event {
                        SessionEvent::RoutineFinished { elapsed_total_seconds, .. } => {
                            elapsed = elapsed_total_seconds;
                        }
                        SessionEvent::CompletionRecorded { .. } => {
                            eprintln!("{}", CompletionSummary::new(routine, elapsed).share_message());
                            return Ok(());
                        }
                        SessionEvent::CompletionFailed { reason } => {
                            eprintln!("streak not saved: {reason}");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            Some(control) = controls.recv() => match control {
                Control::TogglePause => handle.toggle_pause()?,
                Control::Next => handle.skip_forward()?,
                Control::Back => handle.skip_backward()?,
                Control::SkipRest => handle.skip_rest()?,
                Control::Restart => handle.restart()?,
                Control::Silent(enabled) => handle.set_silent_mode(enabled)?,
                Control::Quit => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_controls() {
        assert_eq!(parse_control("p"), Some(Control::TogglePause));
        assert_eq!(parse_control(" n \n"), Some(Control::Next));
        assert_eq!(parse_control("silent on"), Some(Control::Silent(true)));
        assert_eq!(parse_control("silent off"), Some(Control::Silent(false)));
        assert_eq!(parse_control("x"), None);
    }
}

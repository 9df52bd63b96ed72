//! Speech and haptic output seams.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::SpeechError;
use crate::storage::VoiceConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub language: String,
    pub pitch: f32,
    pub rate: f32,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self::from(&VoiceConfig::default())
    }
}

impl From<&VoiceConfig> for SpeechOptions {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            language: config.language.clone(),
            pitch: config.pitch,
            rate: config.rate,
        }
    }
}

/// Text-to-speech backend.
///
/// `speak` must return immediately; playback happens in the background.
/// `stop` cuts off whatever is currently playing.
pub trait SpeechBackend: Send + Sync {
    fn speak(&self, text: &str, options: &SpeechOptions) -> Result<(), SpeechError>;
    fn stop(&self);
}

/// Short vibration on the host device.
pub trait Haptics: Send + Sync {
    fn pulse(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHaptics;

impl Haptics for NoopHaptics {
    fn pulse(&self) {}
}

/// One call made against a [`RecordingSpeech`].
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechCall {
    Speak(String),
    Stop,
}

/// Speech backend that only remembers what it was asked to do. Used by
/// headless hosts and tests.
#[derive(Debug, Default)]
pub struct RecordingSpeech {
    calls: Mutex<Vec<SpeechCall>>,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SpeechCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Texts passed to `speak`, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SpeechCall::Speak(text) => Some(text),
                SpeechCall::Stop => None,
            })
            .collect()
    }

    fn push(&self, call: SpeechCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl SpeechBackend for RecordingSpeech {
    fn speak(&self, text: &str, _options: &SpeechOptions) -> Result<(), SpeechError> {
        self.push(SpeechCall::Speak(text.to_string()));
        Ok(())
    }

    fn stop(&self) {
        self.push(SpeechCall::Stop);
    }
}

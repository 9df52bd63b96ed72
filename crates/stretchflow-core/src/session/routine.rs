use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One timed exercise within a routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub name: String,
    /// Duration in seconds.
    #[serde(alias = "duration")]
    pub duration_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    /// Performed once per side; the midpoint cues a side switch.
    #[serde(default)]
    pub unilateral: bool,
}

impl Step {
    pub fn new(name: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            name: name.into(),
            duration_seconds,
            instruction: None,
            unilateral: false,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn unilateral(mut self) -> Self {
        self.unilateral = true;
        self
    }

    /// Remaining-seconds value at which the halfway cue fires.
    pub fn halfway_mark(&self) -> u32 {
        self.duration_seconds / 2
    }
}

/// An ordered list of steps plus whatever catalog metadata came with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub title: String,
    #[serde(alias = "stretches")]
    pub steps: Vec<Step>,
    /// Difficulty, tags, muscle groups and the like. Carried, never read.
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Routine {
    pub fn new(title: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            title: title.into(),
            steps,
            metadata: serde_json::Map::new(),
        }
    }

    /// Reject routines the sequencer cannot run.
    ///
    /// # Errors
    /// Returns an error when there are no steps or a step lasts zero seconds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::EmptyRoutine {
                title: self.title.clone(),
            });
        }
        if let Some((index, step)) = self
            .steps
            .iter()
            .enumerate()
            .find(|(_, s)| s.duration_seconds == 0)
        {
            return Err(ValidationError::NonPositiveDuration {
                index,
                name: step.name.clone(),
            });
        }
        Ok(())
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn total_step_seconds(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.duration_seconds)).sum()
    }

    /// Step seconds plus the fixed rests between steps.
    pub fn planned_seconds(&self, rest_seconds: u32) -> u64 {
        let rests = self.steps.len().saturating_sub(1) as u64;
        self.total_step_seconds() + rests * u64::from(rest_seconds)
    }

    /// Cumulative step seconds up to (but not including) `step_index`.
    pub fn cumulative_seconds(&self, step_index: usize) -> u64 {
        self.steps
            .iter()
            .take(step_index)
            .map(|s| u64::from(s.duration_seconds))
            .sum()
    }
}

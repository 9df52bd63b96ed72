//! Calendar-day completion streaks.
//!
//! A streak counts consecutive local calendar days with at least one
//! completed routine. It is recomputed from the stored profile on every
//! completion, so nothing needs to stay cached between app launches.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::user::{ProfileSummary, UserProfile, HISTORY_DATE_FORMAT};
use crate::error::StorageError;
use crate::session::Routine;
use crate::storage::{get_json, set_json, KeyValueStore};

/// Storage key for [`UserProfile`].
pub const PROFILE_KEY: &str = "stretchflow_user";

/// How a completion moved the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    /// First completion ever.
    Started,
    /// Last completion was yesterday.
    Extended,
    /// Already completed something today.
    SameDay,
    /// A day or more was missed.
    Reset,
}

impl StreakChange {
    pub fn between(last: Option<NaiveDate>, today: NaiveDate) -> Self {
        match last.map(|d| (today - d).num_days()) {
            None => StreakChange::Started,
            Some(1) => StreakChange::Extended,
            Some(0) => StreakChange::SameDay,
            Some(_) => StreakChange::Reset,
        }
    }

    /// Apply this change to the previous streak value.
    pub fn apply(self, previous: u32) -> u32 {
        match self {
            StreakChange::Extended => previous.saturating_add(1),
            StreakChange::SameDay => previous.max(1),
            StreakChange::Started | StreakChange::Reset => 1,
        }
    }
}

/// Outcome of one recorded completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub date: NaiveDate,
    pub previous_streak: u32,
    pub streak: u32,
    pub change: StreakChange,
}

pub struct StreakRecorder {
    store: Arc<dyn KeyValueStore>,
}

impl StreakRecorder {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored profile, or an empty one if none was saved yet.
    ///
    /// # Errors
    /// Returns the storage error, or `Corrupt` if the stored document is
    /// unreadable. Callers must not overwrite a profile they could not read.
    pub async fn load_profile(&self) -> Result<UserProfile, StorageError> {
        Ok(get_json::<UserProfile>(self.store.as_ref(), PROFILE_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Record a finished routine against today's local date.
    ///
    /// # Errors
    /// Returns the storage error; the profile is left untouched.
    pub async fn record_completion(&self, routine: &Routine) -> Result<CompletionRecord, StorageError> {
        self.record_completion_on(routine, Local::now().date_naive()).await
    }

    /// Record a finished routine against an explicit calendar date.
    ///
    /// # Errors
    /// Returns the storage error; the profile is left untouched.
    #[instrument(skip(self, routine), fields(title = %routine.title))]
    pub async fn record_completion_on(
        &self,
        routine: &Routine,
        today: NaiveDate,
    ) -> Result<CompletionRecord, StorageError> {
        let mut profile = self.load_profile().await?;

        let change = StreakChange::between(profile.last_completed_date, today);
        let previous_streak = profile.streak;
        let streak = change.apply(previous_streak);

        profile.streak = streak;
        profile.last_completed_date = Some(today);
        profile.last_routine = Some(serde_json::to_value(routine).map_err(|source| {
            StorageError::Corrupt {
                key: PROFILE_KEY.to_string(),
                source,
            }
        })?);
        profile
            .history
            .insert(today.format(HISTORY_DATE_FORMAT).to_string(), routine.title.clone());

        set_json(self.store.as_ref(), PROFILE_KEY, &profile).await?;
        info!(streak, previous_streak, ?change, "completion recorded");

        Ok(CompletionRecord {
            date: today,
            previous_streak,
            streak,
            change,
        })
    }

    /// Summary for home and history screens.
    ///
    /// # Errors
    /// Returns the storage error if the profile cannot be read.
    pub async fn summary(&self) -> Result<ProfileSummary, StorageError> {
        Ok(self.load_profile().await?.summary(Local::now().date_naive()))
    }

    /// Forget streak, history and every other profile field.
    ///
    /// # Errors
    /// Returns the storage error if the profile cannot be removed.
    pub async fn reset(&self) -> Result<(), StorageError> {
        self.store.remove_item(PROFILE_KEY).await?;
        info!("profile reset");
        Ok(())
    }
}

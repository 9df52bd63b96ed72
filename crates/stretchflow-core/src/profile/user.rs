use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Streak lengths that earn a badge.
pub const STREAK_MILESTONES: [u32; 5] = [3, 7, 14, 30, 60];

/// Date format used for `history` keys.
pub const HISTORY_DATE_FORMAT: &str = "%Y-%m-%d";

/// The persisted user document, as far as the session engine cares.
///
/// Fields owned by other parts of the app (name, onboarding answers, ...)
/// ride along in `extra` so a streak write never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub streak: u32,
    #[serde(default, alias = "lastCompleted")]
    pub last_completed_date: Option<NaiveDate>,
    /// Last completed routine, stored as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_routine: Option<serde_json::Value>,
    /// `YYYY-MM-DD` -> title of the last routine finished that day.
    #[serde(default)]
    pub history: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Streak as it stands on `today`: a streak whose last day is older than
    /// yesterday has already lapsed even though it is still stored.
    pub fn effective_streak(&self, today: NaiveDate) -> u32 {
        match self.last_completed_date.map(|d| (today - d).num_days()) {
            Some(0) | Some(1) => self.streak,
            _ => 0,
        }
    }

    /// Number of distinct days with at least one completion.
    pub fn active_days(&self) -> usize {
        self.history.len()
    }

    pub fn last_routine_title(&self) -> Option<&str> {
        self.last_routine
            .as_ref()
            .and_then(|r| r.get("title"))
            .and_then(|t| t.as_str())
    }

    pub fn summary(&self, today: NaiveDate) -> ProfileSummary {
        let streak = self.effective_streak(today);
        let next = next_milestone(streak);
        ProfileSummary {
            streak,
            stored_streak: self.streak,
            last_completed_date: self.last_completed_date,
            last_routine_title: self.last_routine_title().map(str::to_string),
            active_days: self.active_days(),
            next_milestone: next,
            days_to_next_milestone: next.map(|m| m - streak),
        }
    }
}

/// Display-friendly profile view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub streak: u32,
    pub stored_streak: u32,
    pub last_completed_date: Option<NaiveDate>,
    pub last_routine_title: Option<String>,
    pub active_days: usize,
    pub next_milestone: Option<u32>,
    pub days_to_next_milestone: Option<u32>,
}

/// Smallest milestone above `streak`, if any remain.
pub fn next_milestone(streak: u32) -> Option<u32> {
    STREAK_MILESTONES.iter().copied().find(|m| *m > streak)
}

mod streak;
mod user;

pub use streak::{CompletionRecord, StreakChange, StreakRecorder, PROFILE_KEY};
pub use user::{next_milestone, ProfileSummary, UserProfile, HISTORY_DATE_FORMAT, STREAK_MILESTONES};

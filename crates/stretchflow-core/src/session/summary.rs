use serde::{Deserialize, Serialize};

use super::routine::Routine;

/// What the completion screen shows and shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub title: String,
    pub step_count: usize,
    pub elapsed_total_seconds: u64,
}

impl CompletionSummary {
    pub fn new(routine: &Routine, elapsed_total_seconds: u64) -> Self {
        Self {
            title: routine.title.clone(),
            step_count: routine.step_count(),
            elapsed_total_seconds,
        }
    }

    pub fn share_message(&self) -> String {
        format!(
            "I just finished my '{}' stretch with StretchFlow! \u{1F4AA} {} moves in {}s. Feeling great!",
            self.title, self.step_count, self.elapsed_total_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Step;

    #[test]
    fn share_message_mentions_moves_and_time() {
        let routine = Routine::new("Desk Break", vec![Step::new("A", 30), Step::new("B", 20)]);
        let summary = CompletionSummary::new(&routine, 60);
        assert_eq!(
            summary.share_message(),
            "I just finished my 'Desk Break' stretch with StretchFlow! 💪 2 moves in 60s. Feeling great!"
        );
    }
}

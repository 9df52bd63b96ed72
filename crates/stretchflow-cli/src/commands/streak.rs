use std::sync::Arc;

use clap::Subcommand;
use stretchflow_core::{SqliteStore, StreakRecorder};

#[derive(Subcommand)]
pub enum StreakAction {
    /// Print the streak summary as JSON
    Show,
    /// Forget the streak and completion history
    Reset,
}

pub fn run(action: StreakAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStore::open()?);
    let recorder = StreakRecorder::new(store);

    super::runtime()?.block_on(async {
        match action {
            StreakAction::Show => {
                let summary = recorder.summary().await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            StreakAction::Reset => {
                recorder.reset().await?;
                println!("streak reset");
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

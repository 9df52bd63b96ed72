use std::sync::Arc;

use clap::{Subcommand, ValueEnum};
use stretchflow_core::premium::provider_from_config;
use stretchflow_core::voice::SILENT_MODE_KEY;
use stretchflow_core::{Config, KeyValueStore, QuotaGate, SqliteStore};

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Subcommand)]
pub enum VoiceAction {
    /// Print this week's voice quota as JSON
    Status {
        /// Report as a premium user
        #[arg(long)]
        premium: bool,
    },
    /// Save the silent-mode preference used when a session starts
    Silent {
        #[arg(value_enum)]
        mode: Toggle,
    },
}

pub fn run(action: VoiceAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open()?);

    super::runtime()?.block_on(async {
        match action {
            VoiceAction::Status { premium } => {
                let premium = premium
                    || provider_from_config(&config, Arc::clone(&store))
                        .is_premium()
                        .await;
                let status = QuotaGate::with_config(store, &config.voice)
                    .status(premium)
                    .await;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            VoiceAction::Silent { mode } => {
                let value = if mode.enabled() { "true" } else { "false" };
                store.set_item(SILENT_MODE_KEY, value).await?;
                println!("silent mode {}", if mode.enabled() { "on" } else { "off" });
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

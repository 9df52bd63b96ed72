use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stretchflow-cli", version, about = "StretchFlow CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or check stretch routines
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Completion streak
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Voice guidance quota and preferences
    Voice {
        #[command(subcommand)]
        action: commands::voice::VoiceAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Streak { action } => commands::streak::run(action),
        Commands::Voice { action } => commands::voice::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

//! The cuecard CLI, terminal flashcard review on top of cuecard-core.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod deck;

#[derive(Parser)]
#[command(name = "cuecard", version, about = "Spaced-repetition flashcard review")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review the cards that are due today
    Review {
        /// Path to the deck .toml file
        #[arg(long)]
        deck: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Answer timeout in milliseconds (0 disables it)
        #[arg(long)]
        time_to_answer: Option<u64>,

        /// Write the new review dates back to the deck
        #[arg(long)]
        save: bool,
    },

    /// Show the review queue for today
    Due {
        /// Path to the deck .toml file
        #[arg(long)]
        deck: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Validate a deck file
    Validate {
        /// Path to the deck .toml file
        #[arg(long)]
        deck: PathBuf,
    },

    /// Create a starter config and deck
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cuecard_core=warn,cuecard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Review {
            deck,
            config,
            time_to_answer,
            save,
        } => commands::review::execute(deck, config, time_to_answer, save).await,
        Commands::Due {
            deck,
            config,
            format,
        } => commands::due::execute(deck, config, format),
        Commands::Validate { deck } => commands::validate::execute(deck),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

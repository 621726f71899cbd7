use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use questline::config::Config;
use questline::{Engine, UserId};

mod cli;

#[derive(Parser)]
#[command(name = "questline")]
#[command(about = "Points, quests and achievements over a local document store")]
#[command(version)]
struct Cli {
    /// User to act as
    #[arg(short, long, global = true, env = "QUESTLINE_USER", default_value = "local")]
    user: String,

    /// Path to the config file (defaults to ~/.questline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the config, publish default quests and register the user
    Init {
        /// Overwrite an existing config file with defaults
        #[arg(long)]
        force: bool,
    },

    /// Show the points balance
    Balance,

    /// Show the points history, newest first
    History {
        /// Only show this many entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Spend points
    Spend {
        amount: i64,

        /// What the points are spent on
        #[arg(default_value = "Purchase")]
        description: String,
    },

    /// Create and answer quizzes
    Quiz {
        #[command(subcommand)]
        command: QuizCommand,
    },

    /// Create, join and leave events
    Event {
        #[command(subcommand)]
        command: EventCommand,
    },

    /// Unlock a collectible (country code)
    Unlock { code: String },

    /// Repair unlocks and catch quest progress up with history
    Sync,

    /// Show quests and the user's progress
    Quests,
}

#[derive(Subcommand)]
pub enum QuizCommand {
    /// Create a quiz
    Create {
        question: String,

        /// Possible answer (repeat for each answer)
        #[arg(long = "answer", required = true)]
        answers: Vec<String>,

        /// Index of the correct answer, starting at 0
        #[arg(long)]
        correct: usize,

        /// Points for a correct answer (default 10)
        #[arg(long)]
        points: Option<i64>,

        /// Collectible granted for a correct answer
        #[arg(long)]
        achievement: Option<String>,
    },

    /// Answer a quiz
    Answer { quiz_id: String, index: usize },
}

#[derive(Subcommand)]
pub enum EventCommand {
    /// Create an event
    Create {
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        location: String,

        /// Days from now until the event
        #[arg(long, default_value_t = 7)]
        in_days: i64,

        /// Points charged for joining
        #[arg(long, default_value_t = 0)]
        price: i64,
    },

    /// Join an event (pays its price)
    Join { event_id: String },

    /// Leave an event (no refund)
    Leave { event_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let user = UserId::new(cli.user);
    let config_path = cli.config.unwrap_or_else(Config::global_config_path);

    if let Commands::Init { force } = cli.command {
        return cli::init::init_command(&config_path, force, &user).await;
    }

    let engine = Engine::open(Config::from_file_or_default(&config_path)?)?;
    match cli.command {
        Commands::Init { .. } => {}
        Commands::Balance => cli::points::balance_command(&engine, &user).await?,
        Commands::History { limit } => {
            cli::points::history_command(&engine, &user, limit).await?;
        }
        Commands::Spend {
            amount,
            description,
        } => {
            cli::points::spend_command(&engine, &user, amount, &description).await?;
        }
        Commands::Quiz { command } => cli::activity::quiz_command(&engine, &user, command).await?,
        Commands::Event { command } => {
            cli::activity::event_command(&engine, &user, command).await?;
        }
        Commands::Unlock { code } => cli::quest::unlock_command(&engine, &user, &code).await?,
        Commands::Sync => cli::quest::sync_command(&engine, &user).await?,
        Commands::Quests => cli::quest::quests_command(&engine, &user).await?,
    }

    Ok(())
}

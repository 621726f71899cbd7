//! Init command implementation

use anyhow::Result;
use std::path::Path;
use tracing::info;

use questline::config::{Config, Provisioned};
use questline::{Engine, UserId};

/// Write the config (unless present), publish the default quests and register `user`
pub async fn init_command(config_path: &Path, force: bool, user: &UserId) -> Result<()> {
    let (config, outcome) = Config::provision(config_path, force)?;
    match outcome {
        Provisioned::Created => println!("Created {}", config_path.display()),
        Provisioned::Existing => info!("Using existing config: {}", config_path.display()),
    }

    let engine = Engine::open(config)?;
    let published = engine.bootstrap().await?;
    if !published.is_empty() {
        println!("Published {} quests", published.len());
    }

    let registration = engine.register_user(user).await?;
    if registration.welcome_bonus {
        println!("Welcome, {user}! You received your starting points.");
    }
    if registration.seed.created > 0 {
        println!(
            "Registered {} collectibles, {} unlocked for you",
            registration.seed.created,
            registration
                .seed
                .unlocks
                .iter()
                .filter(|(_, r)| r.is_ok())
                .count()
        );
    }
    super::print_report(&registration.progress);

    println!(
        "Balance: {} points",
        engine.ledger.get_balance(user).await?
    );
    Ok(())
}

//! Quest, unlock and sync commands

use anyhow::Result;

use questline::achievements::{Country, UnlockOutcome};
use questline::{Engine, QuestState, UserId};

pub async fn quests_command(engine: &Engine, user: &UserId) -> Result<()> {
    let quests = engine.progress.quests().await?;
    if quests.is_empty() {
        println!("No quests published. Run `questline init` first.");
        return Ok(());
    }

    println!("Quests ({}):\n", quests.len());
    for quest in quests {
        let state = match quest.state_for(user) {
            QuestState::Completed => "completed".to_string(),
            _ if quest.has_ended() => "closed".to_string(),
            QuestState::NotStarted if !quest.is_active() => format!(
                "opens {}",
                quest.start_date.format("%Y-%m-%d")
            ),
            QuestState::NotStarted => "not started".to_string(),
            QuestState::InProgress(n) => format!(
                "{n} ({:.0}%)",
                quest.progress_fraction(user) * 100.0
            ),
        };
        println!("  {} [{}] +{} points", quest.title, state, quest.points);
        println!(
            "    {} - ends {}",
            quest.description,
            quest.end_date.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub async fn unlock_command(engine: &Engine, user: &UserId, code: &str) -> Result<()> {
    let code = code.to_uppercase();
    let name = Country::get(&code).map(|c| c.name).unwrap_or("Unknown");

    match engine.achievements.unlock(&code, user).await? {
        UnlockOutcome::Unlocked(_) => {
            println!("Unlocked {name} ({code})");
            let report = engine.progress.handle_achievement_unlock(user, &code).await;
            super::print_report(&report);
        }
        UnlockOutcome::AlreadyUnlocked(at) => {
            println!("{name} already unlocked on {}", at.format("%Y-%m-%d"));
        }
    }
    Ok(())
}

pub async fn sync_command(engine: &Engine, user: &UserId) -> Result<()> {
    let report = engine.sync(user).await?;
    if report.reconcile.is_consistent() {
        println!("Achievements consistent");
    } else {
        println!("Repaired {} unlocks", report.reconcile.repairs.len());
        for repair in report.reconcile.failures() {
            if let Err(e) = &repair.outcome {
                eprintln!("  {}: {e}", repair.collectible_id);
            }
        }
    }
    super::print_report(&report.progress);
    Ok(())
}

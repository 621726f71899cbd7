//! CLI command implementations

pub mod activity;
pub mod init;
pub mod points;
pub mod quest;

use questline::domain::ProgressChange;
use questline::ledger::Credit;
use questline::progress::ProgressReport;

/// Print what a handler did. Failures are shown but never fail the command.
pub fn print_report(report: &ProgressReport) {
    if let Some(skip) = report.skipped {
        println!("  Nothing to record ({skip:?})");
        return;
    }
    if let Some(Ok(Credit::Posted(posting))) = &report.credit {
        println!(
            "  +{} points (balance {})",
            posting.transaction.amount, posting.balance
        );
    }
    if let Some(Ok(outcome)) = &report.achievement {
        if outcome.is_new() {
            println!("  Unlocked a new collectible");
        }
    }

    for quest in &report.quests {
        match &quest.result {
            Ok(update) => {
                match update.change {
                    ProgressChange::Advanced { progress } | ProgressChange::Retreated { progress } => {
                        println!("  {}: {}", quest.quest_id, progress);
                    }
                    ProgressChange::Completed { progress } => {
                        println!("  {}: {} - completed!", quest.quest_id, progress);
                    }
                    _ => {}
                }
                if let Some(Ok(Credit::Posted(posting))) = &update.reward {
                    println!(
                        "  Quest reward +{} points (balance {})",
                        posting.transaction.amount, posting.balance
                    );
                }
            }
            Err(e) => eprintln!("  {}: not updated ({e})", quest.quest_id),
        }
    }
    for error in &report.errors {
        eprintln!("  Progress not recorded: {error}");
    }
}

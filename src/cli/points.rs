//! Balance, history and spend commands

use anyhow::Result;

use questline::{Engine, TransactionType, UserId};

pub async fn balance_command(engine: &Engine, user: &UserId) -> Result<()> {
    let balance = engine.ledger.get_balance(user).await?;
    println!("{user}: {balance} points");
    Ok(())
}

pub async fn history_command(engine: &Engine, user: &UserId, limit: Option<usize>) -> Result<()> {
    let history = engine.ledger.get_history(user).await?;
    if history.is_empty() {
        println!("No transactions yet.");
        return Ok(());
    }

    let shown = limit.unwrap_or(history.len());
    println!("Transactions ({} of {}):\n", shown.min(history.len()), history.len());
    for tx in history.iter().take(shown) {
        println!(
            "  {} {:>+6} {:<12} {}",
            tx.timestamp.format("%Y-%m-%d %H:%M"),
            tx.amount,
            tx.kind,
            tx.description
        );
    }
    Ok(())
}

pub async fn spend_command(
    engine: &Engine,
    user: &UserId,
    amount: i64,
    description: &str,
) -> Result<()> {
    let posting = engine
        .ledger
        .spend_points(user, amount, TransactionType::Purchase, description)
        .await?;
    println!("Spent {amount} points, balance {}", posting.balance);
    Ok(())
}

//! Expense commands

use anyhow::Result;
use ledgerly_core::db::Database;

use super::truncate;

pub fn cmd_expenses_list(db: &Database, org: i64, user: Option<&str>, limit: i64) -> Result<()> {
    let expenses = db.list_expenses(org, user, limit, 0)?;

    if expenses.is_empty() {
        println!("No expenses found.");
        return Ok(());
    }

    println!();
    println!("💳 Expenses");
    println!("   ─────────────────────────────────────────────────────────────");

    for e in expenses {
        println!(
            "   [{}] {} │ ${:>9.2} │ {:<20} │ {:<24} │ {}{}",
            e.id,
            e.date,
            e.amount,
            truncate(e.category.as_deref().unwrap_or("Uncategorized"), 20),
            truncate(&e.merchant, 24),
            e.user_id,
            if e.receipt_id.is_some() { " 🧾" } else { "" }
        );
    }

    Ok(())
}

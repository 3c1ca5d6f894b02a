//! Imported transaction commands

use anyhow::{anyhow, Result};
use ledgerly_core::db::Database;
use ledgerly_core::models::TransactionStatus;
use ledgerly_core::RuleEngine;

use super::{print_rule_summary, truncate};

pub fn cmd_transactions_list(
    db: &Database,
    org: i64,
    status: Option<&str>,
    limit: i64,
) -> Result<()> {
    let status: Option<TransactionStatus> = status
        .map(|s| s.parse().map_err(|e: String| anyhow!(e)))
        .transpose()?;
    let transactions = db.list_imported_transactions(org, status, limit, 0)?;

    if transactions.is_empty() {
        println!("No transactions found. Import some with:");
        println!("  ledgerly import --file statement.csv");
        return Ok(());
    }

    let total = db.count_imported_transactions(org, status)?;

    println!();
    println!("📝 Imported Transactions ({} total)", total);
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        let amount_str = if tx.amount < 0.0 {
            format!("\x1b[31m${:.2}\x1b[0m", tx.amount.abs()) // Red for charges
        } else {
            format!("\x1b[32m+${:.2}\x1b[0m", tx.amount) // Green for credits
        };

        println!(
            "   [{}] {} │ {:>10} │ {:<9} │ {:<20} │ {}",
            tx.id,
            tx.date,
            amount_str,
            tx.status,
            truncate(tx.category.as_deref().unwrap_or("-"), 20),
            truncate(tx.merchant_or_description(), 35)
        );
    }

    Ok(())
}

pub fn cmd_transactions_apply_rules(db: &Database, org: i64) -> Result<()> {
    let summary = RuleEngine::new(db).apply_rules_to_new(org)?;
    if summary.processed == 0 {
        println!("No new transactions to classify.");
        return Ok(());
    }
    print_rule_summary(&summary);
    Ok(())
}

pub fn cmd_transactions_ignore(db: &Database, id: i64) -> Result<()> {
    let tx = db.ignore_transaction(id)?;
    println!("✅ Ignored transaction {}:", id);
    println!(
        "   {} │ ${:.2} │ {}",
        tx.date,
        tx.amount.abs(),
        truncate(&tx.description, 40)
    );
    Ok(())
}

pub fn cmd_transactions_reclassify(db: &Database, id: i64) -> Result<()> {
    let (tx, outcome) = RuleEngine::new(db).reclassify(id)?;
    match outcome {
        Some(outcome) => println!(
            "✅ Transaction {} now matches rule {} ({}): {}",
            id,
            outcome.rule_id,
            outcome.rule_name,
            outcome.category.as_deref().unwrap_or(outcome.action.as_str())
        ),
        None => println!("ℹ️  No rule matches transaction {}; it is back to new", id),
    }
    println!("   {} │ {}", tx.status, truncate(tx.merchant_or_description(), 40));
    Ok(())
}

pub fn cmd_transactions_convert(
    db: &Database,
    id: i64,
    user: &str,
    category: Option<&str>,
) -> Result<()> {
    let expense = db.convert_transaction_to_expense(id, user, category)?;
    println!("✅ Created expense {} from transaction {}", expense.id, id);
    println!(
        "   {} │ ${:.2} │ {} │ {}",
        expense.date,
        expense.amount,
        expense.category.as_deref().unwrap_or("Uncategorized"),
        truncate(&expense.merchant, 40)
    );
    Ok(())
}

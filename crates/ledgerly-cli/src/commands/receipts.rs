//! Receipt OCR commands

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ledgerly_core::db::Database;
use ledgerly_core::models::ExtractedLineItem;
use ledgerly_core::ocr;

use super::truncate;

fn read_ocr_text(file: &Path) -> Result<String> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read OCR text: {}", file.display()))?;
    if text.trim().is_empty() {
        return Err(anyhow!("{} contains no text", file.display()));
    }
    Ok(text)
}

fn print_items(items: &[ExtractedLineItem]) {
    if items.is_empty() {
        println!("   No line items recognized");
        return;
    }
    for item in items {
        println!(
            "   {:<32} ${:>8.2} │ {:<22} │ {:.0}%",
            truncate(&item.description, 32),
            item.amount,
            item.suggested_category,
            item.confidence * 100.0
        );
    }
}

/// Show what would be extracted from OCR text without storing anything
pub fn cmd_receipts_extract(file: &Path) -> Result<()> {
    let text = read_ocr_text(file)?;
    let extraction = ocr::extract_receipt(&text);

    println!();
    println!("🧾 Extracted Line Items");
    println!("   ─────────────────────────────────────────────────────────────");
    print_items(&extraction.items);

    if let Some(total) = extraction.detected_total {
        println!("   Receipt total: ${:.2}", total);
    }

    if extraction.suggest_split {
        println!();
        println!("   💡 Suggest splitting this receipt:");
        for split in &extraction.splits {
            println!(
                "      {:<22} ${:>8.2} ({} item(s))",
                split.category, split.amount, split.item_count
            );
        }
    }

    Ok(())
}

/// Store a receipt, optionally attaching it to an expense
pub fn cmd_receipts_add(
    db: &Database,
    org: i64,
    file: &Path,
    expense_id: Option<i64>,
) -> Result<()> {
    let text = read_ocr_text(file)?;
    let mut receipt = db.create_receipt_from_ocr(org, &text)?;

    println!("✅ Stored receipt #{}", receipt.id);
    print_items(&receipt.extracted_line_items);
    if receipt.suggest_split {
        println!("   💡 Items span several categories; consider splitting");
    }

    if let Some(expense_id) = expense_id {
        receipt = db.attach_receipt(receipt.id, expense_id)?;
        println!("   🔗 Attached to expense #{}", expense_id);
    }

    tracing::debug!(receipt_id = receipt.id, expense_id = ?receipt.expense_id, "Receipt saved");
    Ok(())
}

pub fn cmd_receipts_list(db: &Database, org: i64, limit: i64) -> Result<()> {
    let receipts = db.list_receipts(org, limit, 0)?;

    if receipts.is_empty() {
        println!("No receipts stored.");
        return Ok(());
    }

    println!();
    println!("🧾 Receipts ({})", receipts.len());
    println!("{}", "─".repeat(70));

    for receipt in &receipts {
        let total = receipt
            .detected_total
            .map(|t| format!("${:.2}", t))
            .unwrap_or_else(|| "N/A".to_string());

        println!(
            "  #{:<5} {} │ {} item(s) │ total {}{}",
            receipt.id,
            receipt.created_at.format("%Y-%m-%d"),
            receipt.extracted_line_items.len(),
            total,
            if receipt.suggest_split { " │ split?" } else { "" }
        );

        if let Some(expense_id) = receipt.expense_id {
            println!("         🔗 Linked to expense #{}", expense_id);
        }
    }

    println!();
    Ok(())
}

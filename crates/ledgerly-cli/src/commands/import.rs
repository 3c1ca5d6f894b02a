//! Transaction import command

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ledgerly_core::db::Database;
use ledgerly_core::import::{self, ImportFormat};
use ledgerly_core::ApplyRulesSummary;

pub fn cmd_import(
    db: &Database,
    org: i64,
    file: &Path,
    format: Option<&str>,
    apply_rules: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let format = match format {
        Some(f) => f.parse::<ImportFormat>().map_err(|e| anyhow!(e))?,
        None => ImportFormat::detect(file.to_str(), &content),
    };

    println!("📥 Importing {} from {}...", format, file.display());

    let summary = import::import_transactions(db, org, content.as_bytes(), format, apply_rules)?;

    println!("   Found {} transactions", summary.parsed);
    println!();
    println!("✅ Import complete!");
    println!("   Imported: {}", summary.inserted);
    if summary.duplicates > 0 {
        println!("   Duplicates: {} (kept with status 'duplicate')", summary.duplicates);
    }

    match &summary.rules {
        Some(rules) => print_rule_summary(rules),
        None if !apply_rules => {
            println!();
            println!("   Rules skipped (--no-rules). Run 'ledgerly transactions apply-rules' later.");
        }
        None => {}
    }

    Ok(())
}

pub fn print_rule_summary(rules: &ApplyRulesSummary) {
    println!();
    println!("📋 Rules");
    println!("   Processed: {}", rules.processed);
    println!("   Matched:   {}", rules.matched);
    println!("   Ignored:   {}", rules.ignored);
    println!("   Unmatched: {}", rules.unmatched);
    if !rules.auto_create_requested.is_empty() {
        println!();
        println!(
            "   💡 {} transaction(s) flagged for expense creation:",
            rules.auto_create_requested.len()
        );
        for id in &rules.auto_create_requested {
            println!("      ledgerly transactions convert {}", id);
        }
    }
}

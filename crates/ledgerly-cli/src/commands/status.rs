//! Status command implementation

use std::path::Path;

use anyhow::Result;

use super::open_db;

pub fn cmd_status(db_path: &Path, org: i64, no_encrypt: bool) -> Result<()> {
    use ledgerly_core::db::DB_KEY_ENV;
    use std::fs;

    println!();
    println!("📊 Ledgerly Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let Ok(stats) = db.store_stats(org) {
                    println!();
                    println!("   Organization: {}", org);
                    println!("   Per-diem rates:    {}", stats.per_diem_rates);
                    println!("   Trips:             {}", stats.trips);
                    println!("   Active rules:      {}", stats.active_rules);
                    println!(
                        "   Transactions:      {} ({} new)",
                        stats.total_transactions, stats.new_transactions
                    );
                    println!("   Expenses:          {}", stats.expenses);
                    println!("   Receipts:          {}", stats.receipts);
                    println!("   Policies:          {}", stats.policies);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, parse_date, current_user)
//! - `expenses` - Expense listing
//! - `import` - Transaction import (CSV, Plaid JSON)
//! - `policies` - Expense policy management and checks
//! - `rates` - Per-diem rates and the single-day calculator
//! - `receipts` - Receipt OCR extraction and storage
//! - `rules` - Transaction rule management
//! - `serve` - Web server command
//! - `status` - Database status
//! - `transactions` - Imported transaction workflow
//! - `trips` - Travel trips and per-diem days

pub mod core;
pub mod expenses;
pub mod import;
pub mod policies;
pub mod rates;
pub mod receipts;
pub mod rules;
pub mod serve;
pub mod status;
pub mod transactions;
pub mod trips;

// Re-export command functions for main.rs
pub use core::*;
pub use expenses::*;
pub use import::*;
pub use policies::*;
pub use rates::*;
pub use receipts::*;
pub use rules::*;
pub use serve::*;
pub use status::*;
pub use transactions::*;
pub use trips::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format an optional amount limit for display
pub fn fmt_limit(limit: Option<f64>) -> String {
    limit
        .map(|v| format!("${:.2}", v))
        .unwrap_or_else(|| "-".to_string())
}

//! Ledgerly Core Library
//!
//! Shared functionality for the Ledgerly expense manager:
//! - Per-diem calculator (GSA-style meal deductions, travel-day proration)
//! - Transaction rule matcher with priority-ordered first-match semantics
//! - OCR line-item extraction and category classification
//! - Expense policy resolution and evaluation
//! - CSV and Plaid JSON import with duplicate detection
//! - Database access and migrations
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod ocr;
pub mod perdiem;
pub mod policy;
pub mod rules;

pub use config::AppConfig;
pub use db::{Database, ExpenseTotals};
pub use error::{Error, Result};
pub use import::{ImportFormat, ImportSummary};
pub use ocr::{CategoryGuess, ReceiptExtraction, SplitLine};
pub use perdiem::{DayFlags, MealType, MealsProvided, TripEstimate};
pub use policy::{
    EffectivePolicy, ExpenseDraft, PolicyCheck, PolicyContext, PolicyReport, PolicySubject,
    PolicyViolation, Severity, ViolationCode,
};
pub use rules::{ApplyRulesSummary, MatchInput, RuleEngine, RuleOutcome};

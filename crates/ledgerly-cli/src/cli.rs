//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ledgerly - Business expense and travel management
#[derive(Parser)]
#[command(name = "ledgerly")]
#[command(about = "Self-hosted expense, per-diem and policy manager", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "ledgerly.db", global = true)]
    pub db: PathBuf,

    /// Organization id (defaults to the configured organization)
    #[arg(long, global = true)]
    pub org: Option<i64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set LEDGERLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status (encryption, size, row counts)
    Status,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires a bearer key from LEDGERLY_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },

    /// Manage per-diem rates (list, set, delete, lookup)
    Rates {
        #[command(subcommand)]
        action: Option<RatesAction>,
    },

    /// Calculate one day's M&IE allowance
    PerDiem {
        /// Full-day M&IE rate
        #[arg(short, long)]
        rate: f64,

        /// First or last day of travel (75%)
        #[arg(long)]
        travel_day: bool,

        /// Breakfast was provided
        #[arg(long)]
        breakfast: bool,

        /// Lunch was provided
        #[arg(long)]
        lunch: bool,

        /// Dinner was provided
        #[arg(long)]
        dinner: bool,
    },

    /// Manage travel trips (list, create, show, meals, status)
    Trips {
        #[command(subcommand)]
        action: Option<TripsAction>,
    },

    /// Manage transaction rules (list, add, delete, enable, disable, test)
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Import bank transactions from CSV or Plaid JSON
    Import {
        /// File to import
        #[arg(short, long)]
        file: PathBuf,

        /// Format: csv or plaid (detected from the file if not specified)
        #[arg(long)]
        format: Option<String>,

        /// Skip rule matching after import
        #[arg(long)]
        no_rules: bool,
    },

    /// Manage imported transactions (list, apply-rules, ignore, convert, reclassify)
    Transactions {
        #[command(subcommand)]
        action: Option<TransactionsAction>,
    },

    /// Receipt OCR commands (extract, add, list)
    Receipts {
        #[command(subcommand)]
        action: Option<ReceiptsAction>,
    },

    /// Manage expense policies (list, add, delete, effective, check)
    Policies {
        #[command(subcommand)]
        action: Option<PoliciesAction>,
    },

    /// List expenses
    Expenses {
        #[command(subcommand)]
        action: Option<ExpensesAction>,
    },
}

#[derive(Subcommand)]
pub enum RatesAction {
    /// List all rates
    List,

    /// Create or replace a rate
    Set {
        /// City, or "*" for the country default
        location: String,

        /// ISO country code (e.g., US)
        country: String,

        /// Nightly lodging rate
        #[arg(long)]
        lodging: f64,

        /// Full-day M&IE rate
        #[arg(long)]
        mie: f64,
    },

    /// Delete a rate
    Delete {
        /// Rate ID
        id: i64,
    },

    /// Find the rate for a location (falls back to the country default)
    Lookup {
        location: String,
        country: String,
    },
}

#[derive(Subcommand)]
pub enum TripsAction {
    /// List trips
    List {
        /// Filter by status: planned, in_progress, completed, cancelled
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Create a trip with rates from the rate table
    Create {
        /// Trip name
        name: String,

        /// Destination city
        #[arg(long)]
        location: String,

        /// Destination country code
        #[arg(long, default_value = "US")]
        country: String,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        /// Traveler (defaults to $USER)
        #[arg(long)]
        user: Option<String>,
    },

    /// Show a trip with its days
    Show {
        /// Trip ID
        id: i64,
    },

    /// Set the meals provided on one trip day
    Meals {
        /// Trip ID
        id: i64,

        /// Day (YYYY-MM-DD)
        date: String,

        #[arg(long)]
        breakfast: bool,

        #[arg(long)]
        lunch: bool,

        #[arg(long)]
        dinner: bool,
    },

    /// Change a trip's status
    Status {
        /// Trip ID
        id: i64,

        /// New status: in_progress, completed, cancelled
        status: String,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List rules in evaluation order
    List {
        /// Hide disabled rules
        #[arg(long)]
        active: bool,
    },

    /// Add a rule
    Add {
        /// Rule name
        name: String,

        /// Action: set_category, ignore, auto_create_expense
        #[arg(long, default_value = "set_category")]
        action: String,

        /// Category assigned by the action
        #[arg(short, long)]
        category: Option<String>,

        /// Merchant/description substring (repeatable)
        #[arg(long = "contains")]
        merchant_contains: Vec<String>,

        /// Exact merchant name (repeatable)
        #[arg(long = "merchant")]
        merchant_exact: Vec<String>,

        /// Provider category (repeatable)
        #[arg(long = "provider-category")]
        categories: Vec<String>,

        /// Minimum absolute amount
        #[arg(long)]
        min: Option<f64>,

        /// Maximum absolute amount
        #[arg(long)]
        max: Option<f64>,

        /// Priority (lower runs first)
        #[arg(short, long, default_value = "100")]
        priority: i32,
    },

    /// Delete a rule
    Delete {
        /// Rule ID
        id: i64,
    },

    /// Enable a rule
    Enable {
        /// Rule ID
        id: i64,
    },

    /// Disable a rule
    Disable {
        /// Rule ID
        id: i64,
    },

    /// Show which rule a transaction would match
    Test {
        /// Transaction description
        description: String,

        /// Transaction amount
        #[arg(short, long, default_value = "0")]
        amount: f64,

        /// Merchant name
        #[arg(short, long)]
        merchant: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// List imported transactions
    List {
        /// Filter by status: new, matched, converted, ignored, duplicate
        #[arg(short, long)]
        status: Option<String>,

        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Run rules over every new transaction
    ApplyRules,

    /// Ignore a transaction
    Ignore {
        /// Transaction ID
        id: i64,
    },

    /// Reset a matched transaction and run the current rules over it
    Reclassify {
        /// Transaction ID
        id: i64,
    },

    /// Convert a transaction into an expense
    Convert {
        /// Transaction ID
        id: i64,

        /// Expense owner (defaults to $USER)
        #[arg(long)]
        user: Option<String>,

        /// Override the category
        #[arg(short, long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReceiptsAction {
    /// Extract line items from OCR text without storing anything
    Extract {
        /// Text file with OCR output
        file: PathBuf,
    },

    /// Store a receipt from OCR text
    Add {
        /// Text file with OCR output
        file: PathBuf,

        /// Attach to this expense
        #[arg(long)]
        expense: Option<i64>,
    },

    /// List receipts
    List {
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum PoliciesAction {
    /// List policies
    List,

    /// Add a policy
    Add {
        /// Policy name
        name: String,

        /// Scope: organization, department, role, user, category
        #[arg(long, default_value = "organization")]
        scope: String,

        /// Department, role, user id or category the policy targets
        #[arg(long)]
        value: Option<String>,

        /// Per-expense limit
        #[arg(long)]
        max_amount: Option<f64>,

        /// Daily total limit
        #[arg(long)]
        max_daily: Option<f64>,

        /// Monthly total limit
        #[arg(long)]
        max_monthly: Option<f64>,

        /// Maximum receipt age in days
        #[arg(long)]
        max_receipt_age: Option<i64>,

        /// Require a receipt
        #[arg(long)]
        receipt_required: bool,

        /// Require a description
        #[arg(long)]
        description_required: bool,

        /// Reject weekend expenses
        #[arg(long)]
        no_weekends: bool,

        /// Priority (lower wins)
        #[arg(short, long, default_value = "100")]
        priority: i32,
    },

    /// Delete a policy
    Delete {
        /// Policy ID
        id: i64,
    },

    /// Show the merged policy for a subject
    Effective {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },

    /// Check a draft expense against policy
    Check {
        /// Amount
        amount: f64,

        /// Expense date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// A receipt is attached
        #[arg(long)]
        receipt: bool,

        /// Receipt date (YYYY-MM-DD)
        #[arg(long)]
        receipt_date: Option<String>,

        /// Submitter (defaults to $USER)
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        role: Option<String>,

        #[arg(long)]
        department: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ExpensesAction {
    /// List expenses
    List {
        /// Only this user's expenses
        #[arg(long)]
        user: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

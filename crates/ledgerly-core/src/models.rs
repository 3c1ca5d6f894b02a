//! Domain models for Ledgerly

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ========== Per-Diem Rate Models ==========

/// Country-wide default rate rows use this as their location
pub const DEFAULT_RATE_LOCATION: &str = "*";

/// A per-diem rate for a location, keyed by (organization, location, country)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerDiemRate {
    pub id: i64,
    pub organization_id: i64,
    /// City or locality (e.g., "Seattle"), or "*" for the country default
    pub location: String,
    /// ISO country code (e.g., "US")
    pub country_code: String,
    /// Maximum nightly lodging
    pub lodging_rate: f64,
    /// Full-day meals and incidental expenses rate
    pub mie_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New or replacement per-diem rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPerDiemRate {
    pub organization_id: i64,
    pub location: String,
    pub country_code: String,
    pub lodging_rate: f64,
    pub mie_rate: f64,
}

// ========== Travel Trip Models ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled trips are frozen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (Self::Planned, Self::InProgress)
                | (Self::Planned, Self::Cancelled)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Cancelled)
        )
    }
}

impl std::str::FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planned" => Ok(Self::Planned),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown trip status: {}", s)),
        }
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A business trip with per-diem allowances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelTrip {
    pub id: i64,
    pub organization_id: i64,
    pub user_id: String,
    pub name: String,
    pub location: String,
    pub country_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: TripStatus,
    /// M&IE rate snapshotted from the rate table at creation
    pub mie_rate: f64,
    /// Lodging rate snapshotted from the rate table at creation
    pub lodging_rate: f64,
    /// Sum of all day allowances, recomputed after every day mutation
    pub total_per_diem: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New trip for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTravelTrip {
    pub organization_id: i64,
    pub user_id: String,
    pub name: String,
    pub location: String,
    pub country_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One calendar day of a trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelTripDay {
    pub id: i64,
    pub trip_id: i64,
    pub date: NaiveDate,
    /// First or last day of the trip (75% M&IE)
    pub is_travel_day: bool,
    pub breakfast_provided: bool,
    pub lunch_provided: bool,
    pub dinner_provided: bool,
    pub adjusted_mie: f64,
}

/// Trip with its days and lodging ceiling (for detail views)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripWithDays {
    #[serde(flatten)]
    pub trip: TravelTrip,
    pub days: Vec<TravelTripDay>,
    /// Maximum reimbursable lodging (nights x lodging rate)
    pub lodging_cap: f64,
}

// ========== Transaction Rule Models ==========

/// Match predicates for a transaction rule
///
/// Every specified predicate must hold. Empty lists and missing bounds are
/// unconstrained, so a rule with no predicates matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleCriteria {
    /// Any listed substring appears in the merchant or description
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merchant_contains: Vec<String>,
    /// Merchant equals any listed value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merchant_exact: Vec<String>,
    /// Provider category intersects this set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Inclusive lower bound on the absolute amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<f64>,
    /// Inclusive upper bound on the absolute amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<f64>,
}

impl RuleCriteria {
    /// True when the rule is a catch-all
    pub fn is_empty(&self) -> bool {
        self.merchant_contains.is_empty()
            && self.merchant_exact.is_empty()
            && self.categories.is_empty()
            && self.amount_min.is_none()
            && self.amount_max.is_none()
    }
}

/// What a matching rule does to a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    SetCategory {
        category: String,
    },
    /// Terminal for the transaction
    Ignore,
    /// Request conversion into an expense (performed separately)
    AutoCreateExpense {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetCategory { .. } => "set_category",
            Self::Ignore => "ignore",
            Self::AutoCreateExpense { .. } => "auto_create_expense",
        }
    }

    /// Category this action assigns, if any
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::SetCategory { category } => Some(category),
            Self::AutoCreateExpense { category } => category.as_deref(),
            Self::Ignore => None,
        }
    }
}

/// An organization-scoped rule for classifying imported transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRule {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    /// Lower values are evaluated first
    pub priority: i32,
    pub is_active: bool,
    pub criteria: RuleCriteria,
    pub action: RuleAction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New rule for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransactionRule {
    pub organization_id: i64,
    pub name: String,
    pub priority: i32,
    #[serde(default)]
    pub criteria: RuleCriteria,
    pub action: RuleAction,
}

/// Partial update for a rule; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRuleUpdate {
    pub name: Option<String>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
    pub criteria: Option<RuleCriteria>,
    pub action: Option<RuleAction>,
}

// ========== Imported Transaction Models ==========

/// Lifecycle of an imported bank/card transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    New,
    Matched,
    Converted,
    Ignored,
    Duplicate,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Matched => "matched",
            Self::Converted => "converted",
            Self::Ignored => "ignored",
            Self::Duplicate => "duplicate",
        }
    }

    /// Transitions are one-way; `new` is the only state that can be re-entered
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match self {
            Self::New => next != Self::New,
            Self::Matched => matches!(next, Self::Converted | Self::Ignored | Self::New),
            Self::Converted | Self::Ignored | Self::Duplicate => false,
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "matched" => Ok(Self::Matched),
            "converted" => Ok(Self::Converted),
            "ignored" => Ok(Self::Ignored),
            "duplicate" => Ok(Self::Duplicate),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw bank/card transaction awaiting classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedTransaction {
    pub id: i64,
    pub organization_id: i64,
    /// Provider transaction id (Plaid `transaction_id`, bank reference)
    pub external_id: Option<String>,
    pub date: NaiveDate,
    pub description: String,
    pub merchant_name: Option<String>,
    pub amount: f64,
    /// Provider-supplied category hierarchy (e.g., ["Travel", "Taxi"])
    pub provider_categories: Vec<String>,
    /// Category assigned by a rule or a user
    pub category: Option<String>,
    pub status: TransactionStatus,
    pub matched_rule_id: Option<i64>,
    pub expense_id: Option<i64>,
    pub duplicate_of: Option<i64>,
    pub import_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportedTransaction {
    /// Merchant name when the provider supplied one, otherwise the description
    pub fn merchant_or_description(&self) -> &str {
        self.merchant_name
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.description)
    }
}

/// Parsed transaction ready for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewImportedTransaction {
    pub external_id: Option<String>,
    pub date: NaiveDate,
    pub description: String,
    pub merchant_name: Option<String>,
    pub amount: f64,
    pub provider_categories: Vec<String>,
    pub import_hash: String,
}

// ========== Expense Models ==========

/// A submitted (or draft) expense
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub organization_id: i64,
    pub user_id: String,
    pub date: NaiveDate,
    pub merchant: String,
    pub amount: f64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub receipt_id: Option<i64>,
    /// Imported transaction this expense was converted from
    pub transaction_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New expense for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub organization_id: i64,
    pub user_id: String,
    pub date: NaiveDate,
    pub merchant: String,
    pub amount: f64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub receipt_id: Option<i64>,
    pub transaction_id: Option<i64>,
}

// ========== Expense Policy Models ==========

/// Who or what a policy applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyScope {
    Organization,
    Department,
    Role,
    User,
    Category,
}

impl PolicyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Department => "department",
            Self::Role => "role",
            Self::User => "user",
            Self::Category => "category",
        }
    }

    /// Tie-breaker between equal priorities: more specific scopes win
    pub fn specificity(&self) -> u8 {
        match self {
            Self::User => 5,
            Self::Role => 4,
            Self::Department => 3,
            Self::Category => 2,
            Self::Organization => 1,
        }
    }
}

impl std::str::FromStr for PolicyScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "organization" | "org" => Ok(Self::Organization),
            "department" | "dept" => Ok(Self::Department),
            "role" => Ok(Self::Role),
            "user" => Ok(Self::User),
            "category" => Ok(Self::Category),
            _ => Err(format!("Unknown policy scope: {}", s)),
        }
    }
}

impl std::fmt::Display for PolicyScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An expense policy; unset fields defer to lower-ranked policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpensePolicy {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub scope: PolicyScope,
    /// Department name, role, user id or category; None for organization scope
    pub scope_value: Option<String>,
    pub max_amount: Option<f64>,
    pub max_daily_total: Option<f64>,
    pub max_monthly_total: Option<f64>,
    pub max_receipt_age_days: Option<i64>,
    pub receipt_required: Option<bool>,
    pub description_required: Option<bool>,
    pub weekends_allowed: Option<bool>,
    /// Lower values win conflicts
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New policy for creation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewExpensePolicy {
    pub organization_id: i64,
    pub name: String,
    pub scope: Option<PolicyScope>,
    pub scope_value: Option<String>,
    pub max_amount: Option<f64>,
    pub max_daily_total: Option<f64>,
    pub max_monthly_total: Option<f64>,
    pub max_receipt_age_days: Option<i64>,
    pub receipt_required: Option<bool>,
    pub description_required: Option<bool>,
    pub weekends_allowed: Option<bool>,
    #[serde(default)]
    pub priority: i32,
}

// ========== Receipt Models ==========

/// A line item recovered from receipt OCR text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLineItem {
    pub description: String,
    pub amount: f64,
    pub suggested_category: String,
    /// 0.0-1.0
    pub confidence: f64,
    /// Keywords that drove the category choice
    pub keywords: Vec<String>,
}

/// A captured receipt with its OCR output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub organization_id: i64,
    pub expense_id: Option<i64>,
    pub ocr_text: Option<String>,
    pub extracted_line_items: Vec<ExtractedLineItem>,
    pub suggest_split: bool,
    /// Amount on the receipt's TOTAL line, if one was found
    pub detected_total: Option<f64>,
    /// SHA-256 of the OCR text
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ========== Audit & Status Models ==========

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_email: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}

/// Row counts for `ledgerly status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub per_diem_rates: i64,
    pub trips: i64,
    pub active_rules: i64,
    pub new_transactions: i64,
    pub total_transactions: i64,
    pub expenses: i64,
    pub policies: i64,
    pub receipts: i64,
}

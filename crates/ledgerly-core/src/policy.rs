//! Expense policy resolution and evaluation
//!
//! Several policies may apply to one expense (organization-wide, a
//! department, a role, a user, a category). They are merged field by field
//! into an [`EffectivePolicy`]: policies are ranked by ascending priority,
//! then by scope specificity (user > role > department > category >
//! organization), then by id, and each field takes its value from the first
//! ranked policy that sets it.
//!
//! [`evaluate`] checks a draft expense against the effective policy and
//! [`PolicyReport`] shapes the findings for display.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{Database, ExpenseTotals};
use crate::error::Result;
use crate::models::{ExpensePolicy, PolicyScope};

/// Default share of `max_amount` at which a warning is raised
pub const DEFAULT_APPROACHING_LIMIT_RATIO: f64 = 0.9;

/// Who is submitting what; used to decide which policies apply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySubject {
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub category: Option<String>,
}

fn same(value: &Option<String>, scope_value: &str) -> bool {
    value
        .as_deref()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(scope_value.trim()))
}

/// Does this policy cover the subject?
///
/// Organization policies always apply. Other scopes need a `scope_value`
/// equal (case-insensitively) to the subject's matching attribute.
pub fn applies_to(policy: &ExpensePolicy, subject: &PolicySubject) -> bool {
    if !policy.is_active {
        return false;
    }
    if policy.scope == PolicyScope::Organization {
        return true;
    }
    let Some(scope_value) = policy.scope_value.as_deref() else {
        return false;
    };
    match policy.scope {
        PolicyScope::Organization => true,
        PolicyScope::Department => same(&subject.department, scope_value),
        PolicyScope::Role => same(&subject.role, scope_value),
        PolicyScope::User => same(&subject.user_id, scope_value),
        PolicyScope::Category => same(&subject.category, scope_value),
    }
}

/// The merged policy that governs one expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub max_amount: Option<f64>,
    pub max_daily_total: Option<f64>,
    pub max_monthly_total: Option<f64>,
    pub max_receipt_age_days: Option<i64>,
    pub receipt_required: bool,
    pub description_required: bool,
    pub weekends_allowed: bool,
    /// Policies that contributed at least one field, in rank order
    pub source_policy_ids: Vec<i64>,
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        Self {
            max_amount: None,
            max_daily_total: None,
            max_monthly_total: None,
            max_receipt_age_days: None,
            receipt_required: false,
            description_required: false,
            weekends_allowed: true,
            source_policy_ids: Vec::new(),
        }
    }
}

/// Merge every applicable policy into one effective policy
pub fn effective_policy(policies: &[ExpensePolicy], subject: &PolicySubject) -> EffectivePolicy {
    let mut ranked: Vec<&ExpensePolicy> = policies
        .iter()
        .filter(|p| applies_to(p, subject))
        .collect();
    ranked.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.scope.specificity().cmp(&a.scope.specificity()))
            .then(a.id.cmp(&b.id))
    });

    let mut max_amount = None;
    let mut max_daily_total = None;
    let mut max_monthly_total = None;
    let mut max_receipt_age_days = None;
    let mut receipt_required = None;
    let mut description_required = None;
    let mut weekends_allowed = None;
    let mut source_policy_ids = Vec::new();

    for policy in ranked {
        let mut contributed = false;
        fill(&mut max_amount, policy.max_amount, &mut contributed);
        fill(&mut max_daily_total, policy.max_daily_total, &mut contributed);
        fill(&mut max_monthly_total, policy.max_monthly_total, &mut contributed);
        fill(&mut max_receipt_age_days, policy.max_receipt_age_days, &mut contributed);
        fill(&mut receipt_required, policy.receipt_required, &mut contributed);
        fill(&mut description_required, policy.description_required, &mut contributed);
        fill(&mut weekends_allowed, policy.weekends_allowed, &mut contributed);
        if contributed {
            source_policy_ids.push(policy.id);
        }
    }

    EffectivePolicy {
        max_amount,
        max_daily_total,
        max_monthly_total,
        max_receipt_age_days,
        receipt_required: receipt_required.unwrap_or(false),
        description_required: description_required.unwrap_or(false),
        weekends_allowed: weekends_allowed.unwrap_or(true),
        source_policy_ids,
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>, contributed: &mut bool) {
    if slot.is_none() && value.is_some() {
        *slot = value;
        *contributed = true;
    }
}

/// An expense as submitted, before it is stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub has_receipt: bool,
    /// Date printed on the receipt; defaults to the expense date
    #[serde(default)]
    pub receipt_date: Option<NaiveDate>,
}

/// Facts about already-recorded spending needed for aggregate limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyContext {
    pub today: NaiveDate,
    /// Existing total for the draft's day, excluding the draft
    pub daily_total: f64,
    /// Existing total for the draft's month, excluding the draft
    pub monthly_total: f64,
    pub approaching_limit_ratio: f64,
}

impl PolicyContext {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            daily_total: 0.0,
            monthly_total: 0.0,
            approaching_limit_ratio: DEFAULT_APPROACHING_LIMIT_RATIO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    AmountExceeded,
    DailyLimitExceeded,
    MonthlyLimitExceeded,
    ReceiptMissing,
    DescriptionMissing,
    WeekendNotAllowed,
    ReceiptTooOld,
    ApproachingAmountLimit,
    InvalidAmount,
    CategoryMissing,
    FutureDate,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmountExceeded => "amount_exceeded",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
            Self::MonthlyLimitExceeded => "monthly_limit_exceeded",
            Self::ReceiptMissing => "receipt_missing",
            Self::DescriptionMissing => "description_missing",
            Self::WeekendNotAllowed => "weekend_not_allowed",
            Self::ReceiptTooOld => "receipt_too_old",
            Self::ApproachingAmountLimit => "approaching_amount_limit",
            Self::InvalidAmount => "invalid_amount",
            Self::CategoryMissing => "category_missing",
            Self::FutureDate => "future_date",
        }
    }
}

impl std::fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One problem found with a draft expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub code: ViolationCode,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
}

impl PolicyViolation {
    fn error(code: ViolationCode, message: String) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message,
            limit: None,
            actual: None,
        }
    }

    fn warning(code: ViolationCode, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    fn with_values(mut self, limit: f64, actual: f64) -> Self {
        self.limit = Some(limit);
        self.actual = Some(actual);
        self
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Check a draft expense against an effective policy
pub fn evaluate(
    draft: &ExpenseDraft,
    policy: &EffectivePolicy,
    context: &PolicyContext,
) -> Vec<PolicyViolation> {
    let mut findings = Vec::new();

    if let Some(max) = policy.max_amount {
        if draft.amount > max {
            findings.push(
                PolicyViolation::error(
                    ViolationCode::AmountExceeded,
                    format!("Amount ${:.2} exceeds the ${:.2} limit", draft.amount, max),
                )
                .with_values(max, draft.amount),
            );
        } else if draft.amount >= max * context.approaching_limit_ratio {
            findings.push(
                PolicyViolation::warning(
                    ViolationCode::ApproachingAmountLimit,
                    format!("Amount ${:.2} is close to the ${:.2} limit", draft.amount, max),
                )
                .with_values(max, draft.amount),
            );
        }
    }

    if let Some(max) = policy.max_daily_total {
        let total = context.daily_total + draft.amount;
        if total > max {
            findings.push(
                PolicyViolation::error(
                    ViolationCode::DailyLimitExceeded,
                    format!("Daily total ${:.2} exceeds the ${:.2} limit", total, max),
                )
                .with_values(max, total),
            );
        }
    }

    if let Some(max) = policy.max_monthly_total {
        let total = context.monthly_total + draft.amount;
        if total > max {
            findings.push(
                PolicyViolation::error(
                    ViolationCode::MonthlyLimitExceeded,
                    format!("Monthly total ${:.2} exceeds the ${:.2} limit", total, max),
                )
                .with_values(max, total),
            );
        }
    }

    if policy.receipt_required && !draft.has_receipt {
        findings.push(PolicyViolation::error(
            ViolationCode::ReceiptMissing,
            "A receipt is required".to_string(),
        ));
    }

    if policy.description_required && is_blank(&draft.description) {
        findings.push(PolicyViolation::error(
            ViolationCode::DescriptionMissing,
            "A description is required".to_string(),
        ));
    }

    if !policy.weekends_allowed && matches!(draft.date.weekday(), Weekday::Sat | Weekday::Sun) {
        findings.push(PolicyViolation::error(
            ViolationCode::WeekendNotAllowed,
            format!("Weekend expenses are not allowed ({})", draft.date),
        ));
    }

    if let Some(max_age) = policy.max_receipt_age_days {
        let receipt_date = draft.receipt_date.unwrap_or(draft.date);
        let age = (context.today - receipt_date).num_days();
        if age > max_age {
            findings.push(
                PolicyViolation::error(
                    ViolationCode::ReceiptTooOld,
                    format!("Receipt is {} days old (limit {})", age, max_age),
                )
                .with_values(max_age as f64, age as f64),
            );
        }
    }

    findings
}

/// Constraints that can be checked without any policy
pub fn precheck(draft: &ExpenseDraft, today: NaiveDate) -> Vec<PolicyViolation> {
    let mut findings = Vec::new();

    if draft.amount.is_nan() || draft.amount <= 0.0 {
        findings.push(PolicyViolation::error(
            ViolationCode::InvalidAmount,
            "Amount must be greater than zero".to_string(),
        ));
    }
    if is_blank(&draft.category) {
        findings.push(PolicyViolation::error(
            ViolationCode::CategoryMissing,
            "A category is required".to_string(),
        ));
    }
    if draft.date > today {
        findings.push(PolicyViolation::error(
            ViolationCode::FutureDate,
            format!("Expense date {} is in the future", draft.date),
        ));
    }

    findings
}

/// Violations and warnings ready for display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyReport {
    pub violations: Vec<PolicyViolation>,
    pub warnings: Vec<PolicyViolation>,
}

impl PolicyReport {
    /// Deduplicate by code (most severe wins) and sort by code
    pub fn from_findings(findings: impl IntoIterator<Item = PolicyViolation>) -> Self {
        let mut by_code: BTreeMap<ViolationCode, PolicyViolation> = BTreeMap::new();
        for finding in findings {
            match by_code.get(&finding.code) {
                Some(existing) if existing.severity <= finding.severity => {}
                _ => {
                    by_code.insert(finding.code, finding);
                }
            }
        }

        let (violations, warnings): (Vec<_>, Vec<_>) = by_code
            .into_values()
            .partition(|f| f.severity == Severity::Error);

        Self {
            violations,
            warnings,
        }
    }

    pub fn is_compliant(&self) -> bool {
        self.violations.is_empty()
    }

    /// One-line description for CLI output and logs
    pub fn summary(&self) -> String {
        match (self.violations.len(), self.warnings.len()) {
            (0, 0) => "Compliant".to_string(),
            (0, w) => format!("Compliant with {} warning(s)", w),
            (v, 0) => format!("{} violation(s)", v),
            (v, w) => format!("{} violation(s), {} warning(s)", v, w),
        }
    }
}

/// Outcome of checking a draft expense against stored policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCheck {
    pub effective: EffectivePolicy,
    pub totals: ExpenseTotals,
    #[serde(flatten)]
    pub report: PolicyReport,
}

/// Check a draft for one user against an organization's active policies
///
/// The subject's user and category default to `user_id` and the draft's
/// category. Prechecks and policy findings land in one report.
pub fn check_expense(
    db: &Database,
    organization_id: i64,
    user_id: &str,
    subject: &PolicySubject,
    draft: &ExpenseDraft,
    today: NaiveDate,
    approaching_limit_ratio: f64,
) -> Result<PolicyCheck> {
    let subject = PolicySubject {
        user_id: subject.user_id.clone().or_else(|| Some(user_id.to_string())),
        category: subject.category.clone().or_else(|| draft.category.clone()),
        ..subject.clone()
    };

    let policies = db.list_expense_policies(organization_id, true)?;
    let effective = effective_policy(&policies, &subject);
    let totals = db.expense_totals(organization_id, user_id, draft.date)?;

    let context = PolicyContext {
        today,
        daily_total: totals.day_total,
        monthly_total: totals.month_total,
        approaching_limit_ratio,
    };

    let mut findings = precheck(draft, today);
    findings.extend(evaluate(draft, &effective, &context));
    let report = PolicyReport::from_findings(findings);

    debug!(
        organization_id,
        user_id,
        policies = effective.source_policy_ids.len(),
        "Policy check: {}",
        report.summary()
    );

    Ok(PolicyCheck {
        effective,
        totals,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn policy(id: i64, scope: PolicyScope, scope_value: Option<&str>, priority: i32) -> ExpensePolicy {
        ExpensePolicy {
            id,
            organization_id: 1,
            name: format!("policy {}", id),
            scope,
            scope_value: scope_value.map(String::from),
            max_amount: None,
            max_daily_total: None,
            max_monthly_total: None,
            max_receipt_age_days: None,
            receipt_required: None,
            description_required: None,
            weekends_allowed: None,
            priority,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn draft(amount: f64, on: NaiveDate) -> ExpenseDraft {
        ExpenseDraft {
            amount,
            date: on,
            category: Some("Meals".into()),
            merchant: Some("Cafe".into()),
            description: None,
            has_receipt: false,
            receipt_date: None,
        }
    }

    fn codes(findings: &[PolicyViolation]) -> Vec<ViolationCode> {
        findings.iter().map(|f| f.code).collect()
    }

    #[test]
    fn test_applies_to_scopes() {
        let subject = PolicySubject {
            user_id: Some("alice@example.com".into()),
            role: Some("manager".into()),
            department: Some("Sales".into()),
            category: Some("Meals".into()),
        };

        assert!(applies_to(&policy(1, PolicyScope::Organization, None, 0), &subject));
        assert!(applies_to(&policy(2, PolicyScope::Department, Some("sales"), 0), &subject));
        assert!(applies_to(&policy(3, PolicyScope::Role, Some("Manager"), 0), &subject));
        assert!(applies_to(&policy(4, PolicyScope::User, Some("alice@example.com"), 0), &subject));
        assert!(applies_to(&policy(5, PolicyScope::Category, Some("meals"), 0), &subject));

        assert!(!applies_to(&policy(6, PolicyScope::Category, Some("Fuel"), 0), &subject));
        assert!(!applies_to(&policy(7, PolicyScope::Role, None, 0), &subject));
        assert!(!applies_to(&policy(8, PolicyScope::User, Some("bob"), 0), &PolicySubject::default()));

        let mut inactive = policy(9, PolicyScope::Organization, None, 0);
        inactive.is_active = false;
        assert!(!applies_to(&inactive, &subject));
    }

    #[test]
    fn test_effective_policy_defaults() {
        let effective = effective_policy(&[], &PolicySubject::default());
        assert_eq!(effective, EffectivePolicy::default());
        assert!(effective.weekends_allowed);
        assert!(!effective.receipt_required);
    }

    #[test]
    fn test_effective_policy_lower_priority_wins() {
        let mut org = policy(1, PolicyScope::Organization, None, 10);
        org.max_amount = Some(500.0);
        org.receipt_required = Some(true);

        let mut meals = policy(2, PolicyScope::Category, Some("Meals"), 5);
        meals.max_amount = Some(75.0);

        let subject = PolicySubject {
            category: Some("Meals".into()),
            ..Default::default()
        };
        let effective = effective_policy(&[org, meals], &subject);

        assert_eq!(effective.max_amount, Some(75.0));
        // Not set by the category policy, so inherited
        assert!(effective.receipt_required);
        assert_eq!(effective.source_policy_ids, vec![2, 1]);
    }

    #[test]
    fn test_effective_policy_ties_go_to_specific_scope() {
        let mut org = policy(1, PolicyScope::Organization, None, 0);
        org.max_amount = Some(500.0);
        let mut user = policy(2, PolicyScope::User, Some("bob"), 0);
        user.max_amount = Some(1000.0);

        let subject = PolicySubject {
            user_id: Some("bob".into()),
            ..Default::default()
        };
        let effective = effective_policy(&[org, user], &subject);
        assert_eq!(effective.max_amount, Some(1000.0));
        // Org policy contributed nothing
        assert_eq!(effective.source_policy_ids, vec![2]);
    }

    #[test]
    fn test_evaluate_amount_limits() {
        let effective = EffectivePolicy {
            max_amount: Some(100.0),
            ..Default::default()
        };
        let context = PolicyContext::new(date(2024, 6, 5));

        assert!(evaluate(&draft(50.0, date(2024, 6, 4)), &effective, &context).is_empty());

        let near = evaluate(&draft(95.0, date(2024, 6, 4)), &effective, &context);
        assert_eq!(codes(&near), vec![ViolationCode::ApproachingAmountLimit]);
        assert_eq!(near[0].severity, Severity::Warning);

        let over = evaluate(&draft(120.0, date(2024, 6, 4)), &effective, &context);
        assert_eq!(codes(&over), vec![ViolationCode::AmountExceeded]);
        assert_eq!(over[0].limit, Some(100.0));
        assert_eq!(over[0].actual, Some(120.0));
    }

    #[test]
    fn test_evaluate_aggregate_limits_include_draft() {
        let effective = EffectivePolicy {
            max_daily_total: Some(100.0),
            max_monthly_total: Some(1000.0),
            ..Default::default()
        };
        let context = PolicyContext {
            daily_total: 80.0,
            monthly_total: 990.0,
            ..PolicyContext::new(date(2024, 6, 5))
        };

        let findings = evaluate(&draft(30.0, date(2024, 6, 5)), &effective, &context);
        assert_eq!(
            codes(&findings),
            vec![
                ViolationCode::DailyLimitExceeded,
                ViolationCode::MonthlyLimitExceeded
            ]
        );
        assert_eq!(findings[0].actual, Some(110.0));
    }

    #[test]
    fn test_evaluate_requirements() {
        let effective = EffectivePolicy {
            receipt_required: true,
            description_required: true,
            weekends_allowed: false,
            max_receipt_age_days: Some(30),
            ..Default::default()
        };
        // 2024-06-01 is a Saturday
        let saturday = date(2024, 6, 1);
        let context = PolicyContext::new(date(2024, 7, 15));

        let mut expense = draft(20.0, saturday);
        expense.description = Some("   ".into());
        let findings = evaluate(&expense, &effective, &context);
        assert_eq!(
            codes(&findings),
            vec![
                ViolationCode::ReceiptMissing,
                ViolationCode::DescriptionMissing,
                ViolationCode::WeekendNotAllowed,
                ViolationCode::ReceiptTooOld,
            ]
        );

        expense.has_receipt = true;
        expense.description = Some("Team lunch".into());
        expense.date = date(2024, 7, 10);
        assert!(evaluate(&expense, &effective, &context).is_empty());
    }

    #[test]
    fn test_precheck() {
        let today = date(2024, 6, 5);
        assert!(precheck(&draft(10.0, today), today).is_empty());

        let mut bad = draft(0.0, date(2024, 6, 6));
        bad.category = None;
        assert_eq!(
            codes(&precheck(&bad, today)),
            vec![
                ViolationCode::InvalidAmount,
                ViolationCode::CategoryMissing,
                ViolationCode::FutureDate
            ]
        );
        assert_eq!(codes(&precheck(&draft(f64::NAN, today), today)), vec![ViolationCode::InvalidAmount]);
    }

    #[test]
    fn test_report_dedupes_and_orders() {
        let findings = vec![
            PolicyViolation::warning(ViolationCode::ApproachingAmountLimit, "near".into()),
            PolicyViolation::error(ViolationCode::ReceiptMissing, "server".into()),
            PolicyViolation::warning(ViolationCode::ReceiptMissing, "client".into()),
            PolicyViolation::error(ViolationCode::AmountExceeded, "over".into()),
            PolicyViolation::error(ViolationCode::AmountExceeded, "over again".into()),
        ];
        let report = PolicyReport::from_findings(findings);

        assert_eq!(
            codes(&report.violations),
            vec![ViolationCode::AmountExceeded, ViolationCode::ReceiptMissing]
        );
        assert_eq!(report.violations[0].message, "over");
        assert_eq!(report.violations[1].message, "server");
        assert_eq!(codes(&report.warnings), vec![ViolationCode::ApproachingAmountLimit]);
        assert!(!report.is_compliant());
        assert_eq!(report.summary(), "2 violation(s), 1 warning(s)");
    }

    #[test]
    fn test_report_compliant_summary() {
        let report = PolicyReport::from_findings(Vec::new());
        assert!(report.is_compliant());
        assert_eq!(report.summary(), "Compliant");

        let warned = PolicyReport::from_findings(vec![PolicyViolation::warning(
            ViolationCode::ApproachingAmountLimit,
            "near".into(),
        )]);
        assert!(warned.is_compliant());
        assert_eq!(warned.summary(), "Compliant with 1 warning(s)");
    }
}

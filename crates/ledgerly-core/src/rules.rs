//! Transaction rule matching for imported bank/card transactions
//!
//! Rules are an ordered decision table: active rules are evaluated in
//! ascending priority (ties by id) and the first rule whose predicates all
//! hold wins. There is no partial-match scoring.
//!
//! Merchant predicates are case-insensitive. `merchant_contains` looks at both
//! the provider merchant name and the raw description; `merchant_exact`
//! compares against the merchant name (or the description when the provider
//! sent no merchant). Amount bounds are inclusive and compare the absolute
//! amount so that bank sign conventions don't matter.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    ImportedTransaction, NewTransactionRule, RuleAction, RuleCriteria, TransactionRule,
    TransactionStatus,
};

/// The transaction fields rules look at
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    pub description: &'a str,
    pub merchant_name: Option<&'a str>,
    pub provider_categories: &'a [String],
    pub amount: f64,
}

impl<'a> MatchInput<'a> {
    /// Input for testing rules against a bare description
    pub fn from_description(description: &'a str, amount: f64) -> Self {
        Self {
            description,
            merchant_name: None,
            provider_categories: &[],
            amount,
        }
    }

    fn merchant(&self) -> &'a str {
        self.merchant_name
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.description)
    }
}

impl<'a> From<&'a ImportedTransaction> for MatchInput<'a> {
    fn from(tx: &'a ImportedTransaction) -> Self {
        Self {
            description: &tx.description,
            merchant_name: tx.merchant_name.as_deref(),
            provider_categories: &tx.provider_categories,
            amount: tx.amount,
        }
    }
}

/// What applying a matched rule does to a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: i64,
    pub rule_name: String,
    pub action: RuleAction,
    /// Status the transaction moves to
    pub status: TransactionStatus,
    /// Category to record, if the action assigns one
    pub category: Option<String>,
    /// The caller should convert this transaction into an expense
    pub create_expense: bool,
}

impl RuleOutcome {
    pub fn from_rule(rule: &TransactionRule) -> Self {
        let status = match rule.action {
            RuleAction::Ignore => TransactionStatus::Ignored,
            RuleAction::SetCategory { .. } | RuleAction::AutoCreateExpense { .. } => {
                TransactionStatus::Matched
            }
        };

        Self {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            action: rule.action.clone(),
            status,
            category: rule.action.category().map(str::to_string),
            create_expense: matches!(rule.action, RuleAction::AutoCreateExpense { .. }),
        }
    }
}

/// Result of running rules over a batch of transactions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyRulesSummary {
    pub processed: i64,
    pub matched: i64,
    pub ignored: i64,
    pub unmatched: i64,
    /// Transactions whose rule requested an expense be created
    pub auto_create_requested: Vec<i64>,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Check every predicate of a rule against a transaction
pub fn criteria_match(criteria: &RuleCriteria, input: &MatchInput<'_>) -> bool {
    if !criteria.merchant_contains.is_empty() {
        let description = input.description.to_lowercase();
        let merchant = input.merchant_name.map(str::to_lowercase);
        let hit = criteria.merchant_contains.iter().any(|pattern| {
            let pattern = normalize(pattern);
            description.contains(&pattern)
                || merchant.as_deref().is_some_and(|m| m.contains(&pattern))
        });
        if !hit {
            return false;
        }
    }

    if !criteria.merchant_exact.is_empty() {
        let merchant = normalize(input.merchant());
        if !criteria
            .merchant_exact
            .iter()
            .any(|value| normalize(value) == merchant)
        {
            return false;
        }
    }

    if !criteria.categories.is_empty() {
        let hit = input.provider_categories.iter().any(|provided| {
            let provided = normalize(provided);
            criteria
                .categories
                .iter()
                .any(|wanted| normalize(wanted) == provided)
        });
        if !hit {
            return false;
        }
    }

    let amount = input.amount.abs();
    if criteria.amount_min.is_some_and(|min| amount < min) {
        return false;
    }
    if criteria.amount_max.is_some_and(|max| amount > max) {
        return false;
    }

    true
}

/// Active rules in evaluation order
fn evaluation_order(rules: &[TransactionRule]) -> Vec<&TransactionRule> {
    let mut ordered: Vec<&TransactionRule> = rules.iter().filter(|r| r.is_active).collect();
    ordered.sort_by_key(|r| (r.priority, r.id));
    ordered
}

/// First active rule (ascending priority) whose predicates all match
pub fn first_match<'r>(
    rules: &'r [TransactionRule],
    input: &MatchInput<'_>,
) -> Option<&'r TransactionRule> {
    evaluation_order(rules)
        .into_iter()
        .find(|rule| criteria_match(&rule.criteria, input))
}

/// Evaluate the rule table and describe what should happen
pub fn evaluate(rules: &[TransactionRule], input: &MatchInput<'_>) -> Option<RuleOutcome> {
    first_match(rules, input).map(RuleOutcome::from_rule)
}

/// Every active rule that would match, in evaluation order (for diagnostics)
pub fn explain_rules<'r>(
    rules: &'r [TransactionRule],
    input: &MatchInput<'_>,
) -> Vec<&'r TransactionRule> {
    evaluation_order(rules)
        .into_iter()
        .filter(|rule| criteria_match(&rule.criteria, input))
        .collect()
}

/// Reject rules that could never behave sensibly
pub fn validate_rule(rule: &NewTransactionRule) -> Result<()> {
    if rule.name.trim().is_empty() {
        return Err(Error::InvalidData("Rule name is required".into()));
    }

    let criteria = &rule.criteria;
    let lists = [
        ("merchant_contains", &criteria.merchant_contains),
        ("merchant_exact", &criteria.merchant_exact),
        ("categories", &criteria.categories),
    ];
    for (field, values) in lists {
        if values.iter().any(|v| v.trim().is_empty()) {
            return Err(Error::InvalidData(format!(
                "{} must not contain blank values",
                field
            )));
        }
    }

    if let (Some(min), Some(max)) = (criteria.amount_min, criteria.amount_max) {
        if min > max {
            return Err(Error::InvalidData(format!(
                "amount_min ({}) is greater than amount_max ({})",
                min, max
            )));
        }
    }

    if let RuleAction::SetCategory { category } = &rule.action {
        if category.trim().is_empty() {
            return Err(Error::InvalidData(
                "set_category requires a category".into(),
            ));
        }
    }

    Ok(())
}

/// Applies an organization's rules to stored transactions
pub struct RuleEngine<'a> {
    db: &'a Database,
}

impl<'a> RuleEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Run the rule table over every `new` transaction of an organization
    pub fn apply_rules_to_new(&self, organization_id: i64) -> Result<ApplyRulesSummary> {
        let rules = self.db.list_transaction_rules(organization_id, true)?;
        let pending = self
            .db
            .list_imported_transactions(organization_id, Some(TransactionStatus::New), i64::MAX, 0)?;

        let mut summary = ApplyRulesSummary::default();
        for tx in &pending {
            summary.processed += 1;
            match self.apply_with(&rules, tx)? {
                Some(outcome) => {
                    if outcome.status == TransactionStatus::Ignored {
                        summary.ignored += 1;
                    } else {
                        summary.matched += 1;
                    }
                    if outcome.create_expense {
                        summary.auto_create_requested.push(tx.id);
                    }
                }
                None => summary.unmatched += 1,
            }
        }

        info!(
            organization_id,
            processed = summary.processed,
            matched = summary.matched,
            ignored = summary.ignored,
            unmatched = summary.unmatched,
            "Applied transaction rules"
        );

        Ok(summary)
    }

    /// Run the rule table over a single transaction
    ///
    /// Only `new` transactions are classified; anything else is left alone.
    pub fn apply_to_transaction(&self, transaction_id: i64) -> Result<Option<RuleOutcome>> {
        let tx = self
            .db
            .get_imported_transaction(transaction_id)?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", transaction_id)))?;

        if tx.status != TransactionStatus::New {
            debug!(
                transaction_id,
                status = %tx.status,
                "Skipping rule evaluation for non-new transaction"
            );
            return Ok(None);
        }

        let rules = self.db.list_transaction_rules(tx.organization_id, true)?;
        self.apply_with(&rules, &tx)
    }

    /// Send a matched transaction back to `new` and run the current rules over it
    pub fn reclassify(
        &self,
        transaction_id: i64,
    ) -> Result<(ImportedTransaction, Option<RuleOutcome>)> {
        self.db.reset_transaction(transaction_id)?;
        let outcome = self.apply_to_transaction(transaction_id)?;
        let tx = self
            .db
            .get_imported_transaction(transaction_id)?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", transaction_id)))?;
        Ok((tx, outcome))
    }

    fn apply_with(
        &self,
        rules: &[TransactionRule],
        tx: &ImportedTransaction,
    ) -> Result<Option<RuleOutcome>> {
        let outcome = evaluate(rules, &MatchInput::from(tx));
        match &outcome {
            Some(outcome) => {
                debug!(
                    transaction_id = tx.id,
                    rule_id = outcome.rule_id,
                    action = outcome.action.as_str(),
                    "Rule matched '{}'",
                    tx.description
                );
                self.db.record_rule_outcome(tx.id, outcome)?;
            }
            None => debug!(transaction_id = tx.id, "No rule matched '{}'", tx.description),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(id: i64, priority: i32, criteria: RuleCriteria, action: RuleAction) -> TransactionRule {
        TransactionRule {
            id,
            organization_id: 1,
            name: format!("rule {}", id),
            priority,
            is_active: true,
            criteria,
            action,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn set_category(category: &str) -> RuleAction {
        RuleAction::SetCategory {
            category: category.to_string(),
        }
    }

    fn contains(patterns: &[&str]) -> RuleCriteria {
        RuleCriteria {
            merchant_contains: patterns.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_priority_one_wins_over_catch_all() {
        let rules = vec![
            rule(1, 1, contains(&["uber"]), set_category("Transport")),
            rule(2, 2, RuleCriteria::default(), set_category("Other")),
        ];
        let input = MatchInput::from_description("UBER TRIP 123", 18.5);

        let outcome = evaluate(&rules, &input).unwrap();
        assert_eq!(outcome.rule_id, 1);
        assert_eq!(outcome.category.as_deref(), Some("Transport"));
        assert_eq!(outcome.status, TransactionStatus::Matched);
        assert!(!outcome.create_expense);
    }

    #[test]
    fn test_evaluation_uses_priority_not_list_order() {
        let rules = vec![
            rule(2, 2, RuleCriteria::default(), set_category("Other")),
            rule(1, 1, contains(&["uber"]), set_category("Transport")),
        ];
        let input = MatchInput::from_description("Uber Eats", 30.0);
        assert_eq!(first_match(&rules, &input).unwrap().id, 1);
    }

    #[test]
    fn test_catch_all_matches_everything() {
        let rules = vec![rule(1, 100, RuleCriteria::default(), set_category("Other"))];
        let input = MatchInput::from_description("ANYTHING AT ALL", 1.0);
        assert_eq!(first_match(&rules, &input).unwrap().id, 1);
    }

    #[test]
    fn test_inactive_rules_are_skipped() {
        let mut inactive = rule(1, 1, contains(&["uber"]), RuleAction::Ignore);
        inactive.is_active = false;
        let rules = vec![inactive];
        assert!(first_match(&rules, &MatchInput::from_description("UBER", 5.0)).is_none());
    }

    #[test]
    fn test_all_predicates_must_match() {
        let criteria = RuleCriteria {
            merchant_contains: vec!["delta".into()],
            categories: vec!["Travel".into()],
            amount_min: Some(100.0),
            amount_max: Some(500.0),
            ..Default::default()
        };
        let rules = vec![rule(1, 1, criteria, set_category("Airfare"))];
        let categories = vec!["travel".to_string(), "Airlines".to_string()];

        let matching = MatchInput {
            description: "DELTA AIR 0062",
            merchant_name: Some("Delta"),
            provider_categories: &categories,
            amount: -320.0,
        };
        assert!(first_match(&rules, &matching).is_some());

        let too_cheap = MatchInput {
            amount: 99.99,
            ..matching
        };
        assert!(first_match(&rules, &too_cheap).is_none());

        let wrong_category = MatchInput {
            provider_categories: &[],
            ..matching
        };
        assert!(first_match(&rules, &wrong_category).is_none());
    }

    #[test]
    fn test_amount_bounds_are_inclusive() {
        let criteria = RuleCriteria {
            amount_min: Some(10.0),
            amount_max: Some(20.0),
            ..Default::default()
        };
        assert!(criteria_match(&criteria, &MatchInput::from_description("x", 10.0)));
        assert!(criteria_match(&criteria, &MatchInput::from_description("x", 20.0)));
        assert!(!criteria_match(&criteria, &MatchInput::from_description("x", 20.01)));
    }

    #[test]
    fn test_merchant_exact_is_case_insensitive_and_whole() {
        let criteria = RuleCriteria {
            merchant_exact: vec!["Starbucks".into()],
            ..Default::default()
        };
        let exact = MatchInput {
            description: "STARBUCKS STORE 00123",
            merchant_name: Some("STARBUCKS"),
            provider_categories: &[],
            amount: 5.0,
        };
        assert!(criteria_match(&criteria, &exact));

        // Falls back to the description when there is no merchant name
        let no_merchant = MatchInput::from_description("STARBUCKS STORE 00123", 5.0);
        assert!(!criteria_match(&criteria, &no_merchant));
    }

    #[test]
    fn test_contains_checks_merchant_name_too() {
        let criteria = contains(&["lyft"]);
        let input = MatchInput {
            description: "PAYMENT 8812",
            merchant_name: Some("Lyft"),
            provider_categories: &[],
            amount: 12.0,
        };
        assert!(criteria_match(&criteria, &input));
    }

    #[test]
    fn test_ignore_and_auto_create_outcomes() {
        let ignore = RuleOutcome::from_rule(&rule(1, 1, contains(&["transfer"]), RuleAction::Ignore));
        assert_eq!(ignore.status, TransactionStatus::Ignored);
        assert_eq!(ignore.category, None);

        let auto = RuleOutcome::from_rule(&rule(
            2,
            1,
            contains(&["hotel"]),
            RuleAction::AutoCreateExpense {
                category: Some("Lodging".into()),
            },
        ));
        assert_eq!(auto.status, TransactionStatus::Matched);
        assert!(auto.create_expense);
        assert_eq!(auto.category.as_deref(), Some("Lodging"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let rules = vec![rule(1, 1, contains(&["uber"]), set_category("Transport"))];
        assert!(evaluate(&rules, &MatchInput::from_description("SHELL OIL", 40.0)).is_none());
    }

    #[test]
    fn test_explain_rules_lists_every_match_in_order() {
        let rules = vec![
            rule(3, 5, RuleCriteria::default(), set_category("Other")),
            rule(1, 1, contains(&["uber"]), set_category("Transport")),
            rule(2, 2, contains(&["eats"]), set_category("Meals")),
        ];
        let matches = explain_rules(&rules, &MatchInput::from_description("UBER EATS", 22.0));
        let ids: Vec<i64> = matches.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_validate_rule() {
        let mut new_rule = NewTransactionRule {
            organization_id: 1,
            name: "Rideshare".into(),
            priority: 1,
            criteria: contains(&["uber"]),
            action: set_category("Transport"),
        };
        assert!(validate_rule(&new_rule).is_ok());

        new_rule.criteria.amount_min = Some(50.0);
        new_rule.criteria.amount_max = Some(10.0);
        assert!(validate_rule(&new_rule).is_err());

        new_rule.criteria = contains(&["  "]);
        assert!(validate_rule(&new_rule).is_err());

        new_rule.criteria = RuleCriteria::default();
        new_rule.action = set_category("");
        assert!(validate_rule(&new_rule).is_err());
    }
}

//! Transaction rule commands

use anyhow::{anyhow, Result};
use ledgerly_core::db::Database;
use ledgerly_core::models::{NewTransactionRule, RuleAction, RuleCriteria, TransactionRule};
use ledgerly_core::rules::{self, MatchInput};

/// Build a rule action from its CLI name
pub fn parse_rule_action(action: &str, category: Option<&str>) -> Result<RuleAction> {
    match action.to_lowercase().replace('-', "_").as_str() {
        "set_category" | "category" => {
            let category = category
                .ok_or_else(|| anyhow!("set_category requires --category"))?;
            Ok(RuleAction::SetCategory {
                category: category.to_string(),
            })
        }
        "ignore" => Ok(RuleAction::Ignore),
        "auto_create_expense" | "expense" => Ok(RuleAction::AutoCreateExpense {
            category: category.map(String::from),
        }),
        other => Err(anyhow!(
            "Unknown rule action '{}'. Use: set_category, ignore, auto_create_expense",
            other
        )),
    }
}

fn describe_action(action: &RuleAction) -> String {
    match action {
        RuleAction::SetCategory { category } => format!("→ {}", category),
        RuleAction::Ignore => "ignore".to_string(),
        RuleAction::AutoCreateExpense { category: Some(c) } => format!("expense → {}", c),
        RuleAction::AutoCreateExpense { category: None } => "expense".to_string(),
    }
}

fn describe_criteria(criteria: &RuleCriteria) -> String {
    if criteria.is_empty() {
        return "(matches everything)".to_string();
    }

    let mut parts = Vec::new();
    if !criteria.merchant_contains.is_empty() {
        parts.push(format!("contains {}", criteria.merchant_contains.join("|")));
    }
    if !criteria.merchant_exact.is_empty() {
        parts.push(format!("merchant = {}", criteria.merchant_exact.join("|")));
    }
    if !criteria.categories.is_empty() {
        parts.push(format!("category in {}", criteria.categories.join("|")));
    }
    match (criteria.amount_min, criteria.amount_max) {
        (Some(min), Some(max)) => parts.push(format!("${:.2}..${:.2}", min, max)),
        (Some(min), None) => parts.push(format!(">= ${:.2}", min)),
        (None, Some(max)) => parts.push(format!("<= ${:.2}", max)),
        (None, None) => {}
    }
    parts.join(", ")
}

fn print_rule(rule: &TransactionRule) {
    println!(
        "   [{}] p{:<4} {} {} │ {} │ {}",
        rule.id,
        rule.priority,
        if rule.is_active { "●" } else { "○" },
        rule.name,
        describe_criteria(&rule.criteria),
        describe_action(&rule.action)
    );
}

pub fn cmd_rules_list(db: &Database, org: i64, active_only: bool) -> Result<()> {
    let rules = db.list_transaction_rules(org, active_only)?;

    if rules.is_empty() {
        println!("No rules defined. Add one with:");
        println!("  ledgerly rules add Rideshare --contains uber --contains lyft --category \"Ground Transportation\"");
        return Ok(());
    }

    println!();
    println!("📋 Transaction Rules (evaluated top to bottom)");
    println!("   ─────────────────────────────────────────────────────────────");
    for rule in &rules {
        print_rule(rule);
    }

    Ok(())
}

pub fn cmd_rules_add(
    db: &Database,
    org: i64,
    name: &str,
    action: &str,
    category: Option<&str>,
    criteria: RuleCriteria,
    priority: i32,
) -> Result<()> {
    let action = parse_rule_action(action, category)?;
    let id = db.create_transaction_rule(&NewTransactionRule {
        organization_id: org,
        name: name.to_string(),
        priority,
        criteria,
        action,
    })?;

    println!("✅ Created rule {}", id);
    if let Some(rule) = db.get_transaction_rule(id)? {
        print_rule(&rule);
    }
    Ok(())
}

pub fn cmd_rules_delete(db: &Database, id: i64) -> Result<()> {
    if !db.delete_transaction_rule(id)? {
        return Err(anyhow!("Rule {} not found", id));
    }
    println!("✅ Deleted rule {}", id);
    Ok(())
}

pub fn cmd_rules_set_active(db: &Database, id: i64, active: bool) -> Result<()> {
    if !db.set_transaction_rule_active(id, active)? {
        return Err(anyhow!("Rule {} not found", id));
    }
    println!(
        "✅ Rule {} {}",
        id,
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub fn cmd_rules_test(
    db: &Database,
    org: i64,
    description: &str,
    merchant: Option<&str>,
    amount: f64,
) -> Result<()> {
    let all_rules = db.list_transaction_rules(org, true)?;
    let input = MatchInput {
        description,
        merchant_name: merchant,
        provider_categories: &[],
        amount,
    };

    println!();
    println!("🔍 Testing: \"{}\" (${:.2})", description, amount);

    let matching = rules::explain_rules(&all_rules, &input);
    match matching.split_first() {
        None => println!("   No rule matches; the transaction stays new"),
        Some((winner, shadowed)) => {
            println!("   Winner:");
            print_rule(winner);
            if !shadowed.is_empty() {
                println!("   Also matching (shadowed):");
                for rule in shadowed {
                    print_rule(rule);
                }
            }
        }
    }

    Ok(())
}

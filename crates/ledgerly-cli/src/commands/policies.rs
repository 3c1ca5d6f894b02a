//! Expense policy commands

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use ledgerly_core::db::Database;
use ledgerly_core::models::NewExpensePolicy;
use ledgerly_core::policy::{self, EffectivePolicy, ExpenseDraft, PolicySubject, Severity};

use super::fmt_limit;

fn fmt_flag(flag: Option<bool>) -> &'static str {
    match flag {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    }
}

pub fn cmd_policies_list(db: &Database, org: i64) -> Result<()> {
    let policies = db.list_expense_policies(org, false)?;

    if policies.is_empty() {
        println!("No policies defined. Add an organization-wide one with:");
        println!("  ledgerly policies add \"Company\" --max-amount 500 --receipt-required");
        return Ok(());
    }

    println!();
    println!("📜 Expense Policies");
    println!("   ─────────────────────────────────────────────────────────────");

    for p in &policies {
        let target = match &p.scope_value {
            Some(value) => format!("{}={}", p.scope, value),
            None => p.scope.to_string(),
        };
        println!(
            "   [{}] p{:<4} {} {} ({})",
            p.id,
            p.priority,
            if p.is_active { "●" } else { "○" },
            p.name,
            target
        );
        println!(
            "        max {} │ daily {} │ monthly {} │ receipt {} │ description {} │ weekends {}",
            fmt_limit(p.max_amount),
            fmt_limit(p.max_daily_total),
            fmt_limit(p.max_monthly_total),
            fmt_flag(p.receipt_required),
            fmt_flag(p.description_required),
            fmt_flag(p.weekends_allowed)
        );
    }

    Ok(())
}

pub fn cmd_policies_add(db: &Database, policy: &NewExpensePolicy) -> Result<()> {
    let id = db.create_expense_policy(policy)?;
    println!("✅ Created policy {} ({})", id, policy.name);
    Ok(())
}

pub fn cmd_policies_delete(db: &Database, id: i64) -> Result<()> {
    if !db.delete_expense_policy(id)? {
        return Err(anyhow!("Policy {} not found", id));
    }
    println!("✅ Deleted policy {}", id);
    Ok(())
}

fn print_effective(effective: &EffectivePolicy) {
    println!("   Max per expense:   {}", fmt_limit(effective.max_amount));
    println!("   Max per day:       {}", fmt_limit(effective.max_daily_total));
    println!("   Max per month:     {}", fmt_limit(effective.max_monthly_total));
    println!(
        "   Max receipt age:   {}",
        effective
            .max_receipt_age_days
            .map(|d| format!("{} days", d))
            .unwrap_or_else(|| "-".to_string())
    );
    println!("   Receipt required:  {}", effective.receipt_required);
    println!("   Description req.:  {}", effective.description_required);
    println!("   Weekends allowed:  {}", effective.weekends_allowed);
    if effective.source_policy_ids.is_empty() {
        println!("   (no policy applies)");
    } else {
        println!("   From policies:     {:?}", effective.source_policy_ids);
    }
}

pub fn cmd_policies_effective(db: &Database, org: i64, subject: &PolicySubject) -> Result<()> {
    let policies = db.list_expense_policies(org, true)?;
    let effective = policy::effective_policy(&policies, subject);

    println!();
    println!("📜 Effective Policy");
    println!("   ─────────────────────────────");
    print_effective(&effective);
    Ok(())
}

pub fn cmd_policies_check(
    db: &Database,
    org: i64,
    user: &str,
    subject: &PolicySubject,
    draft: &ExpenseDraft,
    today: NaiveDate,
    approaching_limit_ratio: f64,
) -> Result<()> {
    let check =
        policy::check_expense(db, org, user, subject, draft, today, approaching_limit_ratio)?;

    println!();
    println!("🔎 Policy Check: ${:.2} on {}", draft.amount, draft.date);
    println!("   ─────────────────────────────");
    println!(
        "   Already spent: ${:.2} that day, ${:.2} that month",
        check.totals.day_total, check.totals.month_total
    );
    println!();

    for finding in check.report.violations.iter().chain(&check.report.warnings) {
        let icon = match finding.severity {
            Severity::Error => "❌",
            Severity::Warning => "⚠️ ",
        };
        println!("   {} {} ({})", icon, finding.message, finding.code);
    }

    if check.report.is_compliant() {
        println!("   ✅ {}", check.report.summary());
    } else {
        println!();
        println!("   {}", check.report.summary());
    }

    Ok(())
}

//! Expense policy operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, parse_enum_column, Database};
use crate::error::{Error, Result};
use crate::models::{ExpensePolicy, NewExpensePolicy, PolicyScope};

const POLICY_COLUMNS: &str = "id, organization_id, name, scope, scope_value, max_amount,
                              max_daily_total, max_monthly_total, max_receipt_age_days,
                              receipt_required, description_required, weekends_allowed,
                              priority, is_active, created_at, updated_at";

fn validate_policy(policy: &NewExpensePolicy) -> Result<()> {
    if policy.name.trim().is_empty() {
        return Err(Error::InvalidData("Policy name is required".into()));
    }

    let scope = policy.scope.unwrap_or(PolicyScope::Organization);
    let has_value = policy
        .scope_value
        .as_deref()
        .is_some_and(|v| !v.trim().is_empty());
    if scope != PolicyScope::Organization && !has_value {
        return Err(Error::InvalidData(format!(
            "A {} policy needs a scope_value",
            scope
        )));
    }

    let limits = [
        ("max_amount", policy.max_amount),
        ("max_daily_total", policy.max_daily_total),
        ("max_monthly_total", policy.max_monthly_total),
    ];
    for (field, value) in limits {
        if value.is_some_and(|v| v.is_nan() || v < 0.0) {
            return Err(Error::InvalidData(format!("{} cannot be negative", field)));
        }
    }
    if policy.max_receipt_age_days.is_some_and(|d| d < 0) {
        return Err(Error::InvalidData(
            "max_receipt_age_days cannot be negative".into(),
        ));
    }
    Ok(())
}

impl Database {
    pub fn create_expense_policy(&self, policy: &NewExpensePolicy) -> Result<i64> {
        validate_policy(policy)?;

        let scope = policy.scope.unwrap_or(PolicyScope::Organization);
        // Organization policies apply to everyone; a value would be ignored
        let scope_value = match scope {
            PolicyScope::Organization => None,
            _ => policy.scope_value.as_deref().map(str::trim),
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO expense_policies (organization_id, name, scope, scope_value, max_amount,
                 max_daily_total, max_monthly_total, max_receipt_age_days, receipt_required,
                 description_required, weekends_allowed, priority)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                policy.organization_id,
                policy.name.trim(),
                scope.as_str(),
                scope_value,
                policy.max_amount,
                policy.max_daily_total,
                policy.max_monthly_total,
                policy.max_receipt_age_days,
                policy.receipt_required,
                policy.description_required,
                policy.weekends_allowed,
                policy.priority,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_expense_policy(&self, id: i64) -> Result<Option<ExpensePolicy>> {
        let conn = self.conn()?;
        let policy = conn
            .query_row(
                &format!("SELECT {} FROM expense_policies WHERE id = ?", POLICY_COLUMNS),
                params![id],
                Self::row_to_expense_policy,
            )
            .optional()?;
        Ok(policy)
    }

    /// List policies by priority, then id
    pub fn list_expense_policies(
        &self,
        organization_id: i64,
        active_only: bool,
    ) -> Result<Vec<ExpensePolicy>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM expense_policies
             WHERE organization_id = ? AND (is_active = 1 OR ? = 0)
             ORDER BY priority ASC, id ASC",
            POLICY_COLUMNS
        ))?;
        let policies = stmt
            .query_map(
                params![organization_id, active_only],
                Self::row_to_expense_policy,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(policies)
    }

    pub fn set_expense_policy_active(&self, id: i64, is_active: bool) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE expense_policies SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![is_active, id],
        )?;
        Ok(updated > 0)
    }

    pub fn delete_expense_policy(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM expense_policies WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    fn row_to_expense_policy(row: &rusqlite::Row) -> rusqlite::Result<ExpensePolicy> {
        let scope: String = row.get(3)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;

        Ok(ExpensePolicy {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            name: row.get(2)?,
            scope: parse_enum_column(3, &scope)?,
            scope_value: row.get(4)?,
            max_amount: row.get(5)?,
            max_daily_total: row.get(6)?,
            max_monthly_total: row.get(7)?,
            max_receipt_age_days: row.get(8)?,
            receipt_required: row.get(9)?,
            description_required: row.get(10)?,
            weekends_allowed: row.get(11)?,
            priority: row.get(12)?,
            is_active: row.get(13)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

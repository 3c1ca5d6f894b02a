//! Transaction rule operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, parse_json_column, Database};
use crate::error::{Error, Result};
use crate::models::{NewTransactionRule, TransactionRule, TransactionRuleUpdate};
use crate::rules::validate_rule;

const RULE_COLUMNS: &str =
    "id, organization_id, name, priority, is_active, criteria, action, created_at, updated_at";

impl Database {
    /// Create a rule after validating its criteria and action
    pub fn create_transaction_rule(&self, rule: &NewTransactionRule) -> Result<i64> {
        validate_rule(rule)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transaction_rules (organization_id, name, priority, criteria, action)
             VALUES (?, ?, ?, ?, ?)",
            params![
                rule.organization_id,
                rule.name.trim(),
                rule.priority,
                serde_json::to_string(&rule.criteria)?,
                serde_json::to_string(&rule.action)?,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_transaction_rule(&self, id: i64) -> Result<Option<TransactionRule>> {
        let conn = self.conn()?;
        let rule = conn
            .query_row(
                &format!("SELECT {} FROM transaction_rules WHERE id = ?", RULE_COLUMNS),
                params![id],
                Self::row_to_transaction_rule,
            )
            .optional()?;
        Ok(rule)
    }

    /// List rules in evaluation order (ascending priority, then id)
    pub fn list_transaction_rules(
        &self,
        organization_id: i64,
        active_only: bool,
    ) -> Result<Vec<TransactionRule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transaction_rules
             WHERE organization_id = ? AND (is_active = 1 OR ? = 0)
             ORDER BY priority ASC, id ASC",
            RULE_COLUMNS
        ))?;
        let rules = stmt
            .query_map(
                params![organization_id, active_only],
                Self::row_to_transaction_rule,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Apply a partial update; the merged rule is re-validated
    pub fn update_transaction_rule(
        &self,
        id: i64,
        update: &TransactionRuleUpdate,
    ) -> Result<TransactionRule> {
        let current = self
            .get_transaction_rule(id)?
            .ok_or_else(|| Error::NotFound(format!("Rule {}", id)))?;

        let merged = NewTransactionRule {
            organization_id: current.organization_id,
            name: update.name.clone().unwrap_or(current.name),
            priority: update.priority.unwrap_or(current.priority),
            criteria: update.criteria.clone().unwrap_or(current.criteria),
            action: update.action.clone().unwrap_or(current.action),
        };
        validate_rule(&merged)?;
        let is_active = update.is_active.unwrap_or(current.is_active);

        let conn = self.conn()?;
        conn.execute(
            "UPDATE transaction_rules
             SET name = ?, priority = ?, is_active = ?, criteria = ?, action = ?,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![
                merged.name.trim(),
                merged.priority,
                is_active,
                serde_json::to_string(&merged.criteria)?,
                serde_json::to_string(&merged.action)?,
                id,
            ],
        )?;

        self.get_transaction_rule(id)?
            .ok_or_else(|| Error::NotFound(format!("Rule {}", id)))
    }

    /// Enable or disable a rule; returns false if it did not exist
    pub fn set_transaction_rule_active(&self, id: i64, is_active: bool) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE transaction_rules SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![is_active, id],
        )?;
        Ok(updated > 0)
    }

    /// Delete a rule; transactions it matched keep their outcome
    pub fn delete_transaction_rule(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM transaction_rules WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    fn row_to_transaction_rule(row: &rusqlite::Row) -> rusqlite::Result<TransactionRule> {
        let criteria: String = row.get(5)?;
        let action: String = row.get(6)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        Ok(TransactionRule {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            name: row.get(2)?,
            priority: row.get(3)?,
            is_active: row.get(4)?,
            criteria: parse_json_column(5, &criteria)?,
            action: parse_json_column(6, &action)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

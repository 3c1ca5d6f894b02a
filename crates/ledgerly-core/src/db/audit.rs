//! Audit log and store statistics

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{AuditEntry, StoreStats};

impl Database {
    /// Log an audit event
    pub fn log_audit(
        &self,
        user_email: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO audit_log (user_email, action, entity_type, entity_id, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![user_email, action, entity_type, entity_id, details],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List audit log entries, newest first
    pub fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, user_email, action, entity_type, entity_id, details
            FROM audit_log
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )?;

        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    user_email: row.get(2)?,
                    action: row.get(3)?,
                    entity_type: row.get(4)?,
                    entity_id: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Row counts for one organization
    pub fn store_stats(&self, organization_id: i64) -> Result<StoreStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> rusqlite::Result<i64> {
            conn.query_row(sql, params![organization_id], |row| row.get(0))
        };

        Ok(StoreStats {
            per_diem_rates: count("SELECT COUNT(*) FROM per_diem_rates WHERE organization_id = ?")?,
            trips: count("SELECT COUNT(*) FROM travel_trips WHERE organization_id = ?")?,
            active_rules: count(
                "SELECT COUNT(*) FROM transaction_rules WHERE organization_id = ? AND is_active = 1",
            )?,
            new_transactions: count(
                "SELECT COUNT(*) FROM imported_transactions WHERE organization_id = ? AND status = 'new'",
            )?,
            total_transactions: count(
                "SELECT COUNT(*) FROM imported_transactions WHERE organization_id = ?",
            )?,
            expenses: count("SELECT COUNT(*) FROM expenses WHERE organization_id = ?")?,
            policies: count("SELECT COUNT(*) FROM expense_policies WHERE organization_id = ?")?,
            receipts: count("SELECT COUNT(*) FROM receipts WHERE organization_id = ?")?,
        })
    }
}

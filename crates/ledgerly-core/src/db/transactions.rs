//! Imported transaction operations

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::expenses::insert_expense;
use super::{parse_date_column, parse_datetime, parse_enum_column, parse_json_column, Database};
use crate::error::{Error, Result};
use crate::models::{Expense, ImportedTransaction, NewExpense, NewImportedTransaction, TransactionStatus};
use crate::rules::RuleOutcome;

const TX_COLUMNS: &str = "id, organization_id, external_id, date, description, merchant_name,
                          amount, provider_categories, category, status, matched_rule_id,
                          expense_id, duplicate_of, import_hash, created_at, updated_at";

impl Database {
    /// Store an imported transaction
    ///
    /// A row whose hash matches an existing non-duplicate row of the same
    /// organization is still stored, with status `duplicate` and
    /// `duplicate_of` pointing at the original.
    pub fn insert_imported_transaction(
        &self,
        organization_id: i64,
        tx: &NewImportedTransaction,
    ) -> Result<ImportedTransaction> {
        let conn = self.conn()?;

        let original: Option<i64> = conn
            .query_row(
                "SELECT id FROM imported_transactions
                 WHERE organization_id = ? AND import_hash = ? AND status != 'duplicate'
                 ORDER BY id LIMIT 1",
                params![organization_id, tx.import_hash],
                |row| row.get(0),
            )
            .optional()?;

        let status = if original.is_some() {
            TransactionStatus::Duplicate
        } else {
            TransactionStatus::New
        };

        conn.execute(
            "INSERT INTO imported_transactions (organization_id, external_id, date, description,
                 merchant_name, amount, provider_categories, status, duplicate_of, import_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                organization_id,
                tx.external_id,
                tx.date.to_string(),
                tx.description,
                tx.merchant_name,
                tx.amount,
                serde_json::to_string(&tx.provider_categories)?,
                status.as_str(),
                original,
                tx.import_hash,
            ],
        )?;
        let id = conn.last_insert_rowid();

        if let Some(original_id) = original {
            debug!(id, original_id, "Imported transaction is a duplicate");
        }

        self.get_imported_transaction(id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))
    }

    pub fn get_imported_transaction(&self, id: i64) -> Result<Option<ImportedTransaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!("SELECT {} FROM imported_transactions WHERE id = ?", TX_COLUMNS),
                params![id],
                Self::row_to_imported_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// List transactions, oldest first so rules apply in import order
    pub fn list_imported_transactions(
        &self,
        organization_id: i64,
        status: Option<TransactionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImportedTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM imported_transactions
             WHERE organization_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY date ASC, id ASC
             LIMIT ?3 OFFSET ?4",
            TX_COLUMNS
        ))?;
        let txs = stmt
            .query_map(
                params![organization_id, status.map(|s| s.as_str()), limit, offset],
                Self::row_to_imported_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Count an organization's transactions, optionally by status
    pub fn count_imported_transactions(
        &self,
        organization_id: i64,
        status: Option<TransactionStatus>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM imported_transactions
             WHERE organization_id = ?1 AND (?2 IS NULL OR status = ?2)",
            params![organization_id, status.map(|s| s.as_str())],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Persist the result of a rule match
    pub fn record_rule_outcome(&self, transaction_id: i64, outcome: &RuleOutcome) -> Result<()> {
        let tx = self.require_transition(transaction_id, outcome.status)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE imported_transactions
             SET status = ?, matched_rule_id = ?, category = COALESCE(?, category),
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![
                outcome.status.as_str(),
                outcome.rule_id,
                outcome.category,
                tx.id
            ],
        )?;
        Ok(())
    }

    /// Mark a transaction as not an expense
    pub fn ignore_transaction(&self, id: i64) -> Result<ImportedTransaction> {
        self.set_transaction_status(id, TransactionStatus::Ignored)
    }

    /// Send a matched transaction back to `new` so rules run over it again
    ///
    /// The rule-assigned category is cleared along with the matched rule.
    pub fn reset_transaction(&self, id: i64) -> Result<ImportedTransaction> {
        self.require_transition(id, TransactionStatus::New)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE imported_transactions
             SET status = 'new', matched_rule_id = NULL, category = NULL,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![id],
        )?;
        self.get_imported_transaction(id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))
    }

    /// Create an expense from a transaction and mark the transaction converted
    ///
    /// The expense amount is the absolute transaction amount, since banks
    /// and Plaid disagree on the sign of outflows. Both writes share one
    /// SQLite transaction.
    pub fn convert_transaction_to_expense(
        &self,
        transaction_id: i64,
        user_id: &str,
        category: Option<&str>,
    ) -> Result<Expense> {
        let tx = self.require_transition(transaction_id, TransactionStatus::Converted)?;

        let expense = NewExpense {
            organization_id: tx.organization_id,
            user_id: user_id.to_string(),
            date: tx.date,
            merchant: tx.merchant_or_description().to_string(),
            amount: tx.amount.abs(),
            category: category.map(String::from).or_else(|| tx.category.clone()),
            description: Some(tx.description.clone()),
            receipt_id: None,
            transaction_id: Some(tx.id),
        };

        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;
        let expense_id = insert_expense(&db_tx, &expense)?;
        db_tx.execute(
            "UPDATE imported_transactions
             SET status = 'converted', expense_id = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![expense_id, tx.id],
        )?;
        db_tx.commit()?;

        info!(transaction_id, expense_id, "Converted transaction to expense");

        self.get_expense(expense_id)?
            .ok_or_else(|| Error::NotFound(format!("Expense {}", expense_id)))
    }

    fn set_transaction_status(
        &self,
        id: i64,
        status: TransactionStatus,
    ) -> Result<ImportedTransaction> {
        self.require_transition(id, status)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE imported_transactions SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![status.as_str(), id],
        )?;
        self.get_imported_transaction(id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))
    }

    /// Load a transaction and check it may move to `next`
    fn require_transition(&self, id: i64, next: TransactionStatus) -> Result<ImportedTransaction> {
        let tx = self
            .get_imported_transaction(id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))?;

        if !tx.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                entity: "transaction",
                from: tx.status.to_string(),
                to: next.to_string(),
            });
        }
        Ok(tx)
    }

    fn row_to_imported_transaction(row: &rusqlite::Row) -> rusqlite::Result<ImportedTransaction> {
        let date: String = row.get(3)?;
        let provider_categories: String = row.get(7)?;
        let status: String = row.get(9)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;

        Ok(ImportedTransaction {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            external_id: row.get(2)?,
            date: parse_date_column(3, &date)?,
            description: row.get(4)?,
            merchant_name: row.get(5)?,
            amount: row.get(6)?,
            provider_categories: parse_json_column(7, &provider_categories)?,
            category: row.get(8)?,
            status: parse_enum_column(9, &status)?,
            matched_rule_id: row.get(10)?,
            expense_id: row.get(11)?,
            duplicate_of: row.get(12)?,
            import_hash: row.get(13)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

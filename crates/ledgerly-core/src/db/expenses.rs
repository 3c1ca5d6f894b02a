//! Expense operations

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{parse_date_column, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Expense, NewExpense};

const EXPENSE_COLUMNS: &str = "id, organization_id, user_id, date, merchant, amount, category,
                               description, receipt_id, transaction_id, created_at, updated_at";

/// Existing spending around a date, used as policy context
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseTotals {
    pub day_total: f64,
    pub month_total: f64,
}

/// Insert on an existing connection so callers can share a transaction
pub(crate) fn insert_expense(conn: &Connection, expense: &NewExpense) -> Result<i64> {
    if expense.merchant.trim().is_empty() {
        return Err(Error::InvalidData("Expense merchant cannot be empty".into()));
    }
    if expense.amount.is_nan() || expense.amount <= 0.0 {
        return Err(Error::InvalidData(format!(
            "Expense amount must be positive, got {}",
            expense.amount
        )));
    }

    conn.execute(
        "INSERT INTO expenses (organization_id, user_id, date, merchant, amount, category,
                               description, receipt_id, transaction_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            expense.organization_id,
            expense.user_id,
            expense.date.to_string(),
            expense.merchant.trim(),
            expense.amount,
            expense.category,
            expense.description,
            expense.receipt_id,
            expense.transaction_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    pub fn create_expense(&self, expense: &NewExpense) -> Result<i64> {
        let conn = self.conn()?;
        insert_expense(&conn, expense)
    }

    pub fn get_expense(&self, id: i64) -> Result<Option<Expense>> {
        let conn = self.conn()?;
        let expense = conn
            .query_row(
                &format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS),
                params![id],
                Self::row_to_expense,
            )
            .optional()?;
        Ok(expense)
    }

    /// List expenses, newest first, optionally for one user
    pub fn list_expenses(
        &self,
        organization_id: i64,
        user_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM expenses
             WHERE organization_id = ?1 AND (?2 IS NULL OR user_id = ?2)
             ORDER BY date DESC, id DESC
             LIMIT ?3 OFFSET ?4",
            EXPENSE_COLUMNS
        ))?;
        let expenses = stmt
            .query_map(
                params![organization_id, user_id, limit, offset],
                Self::row_to_expense,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(expenses)
    }

    /// A user's recorded spending on `date` and across `date`'s calendar month
    pub fn expense_totals(
        &self,
        organization_id: i64,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<ExpenseTotals> {
        let month = date.format("%Y-%m").to_string();
        let conn = self.conn()?;

        let (day_total, month_total): (f64, f64) = conn.query_row(
            "SELECT
                 COALESCE(SUM(CASE WHEN date = ?3 THEN amount ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN substr(date, 1, 7) = ?4 THEN amount ELSE 0 END), 0)
             FROM expenses
             WHERE organization_id = ?1 AND user_id = ?2",
            params![
                organization_id,
                user_id,
                date.to_string(),
                month
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(ExpenseTotals {
            day_total,
            month_total,
        })
    }

    fn row_to_expense(row: &rusqlite::Row) -> rusqlite::Result<Expense> {
        let date: String = row.get(3)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        Ok(Expense {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            user_id: row.get(2)?,
            date: parse_date_column(3, &date)?,
            merchant: row.get(4)?,
            amount: row.get(5)?,
            category: row.get(6)?,
            description: row.get(7)?,
            receipt_id: row.get(8)?,
            transaction_id: row.get(9)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

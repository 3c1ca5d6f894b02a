//! Receipt operations

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{parse_datetime, parse_json_column, Database};
use crate::error::{Error, Result};
use crate::models::Receipt;
use crate::ocr;

const RECEIPT_COLUMNS: &str = "id, organization_id, expense_id, ocr_text, extracted_line_items,
                               suggest_split, detected_total, content_hash, created_at, updated_at";

impl Database {
    /// Store a receipt from OCR text, extracting and classifying its line items
    ///
    /// Identical text for the same organization returns the existing receipt.
    pub fn create_receipt_from_ocr(&self, organization_id: i64, ocr_text: &str) -> Result<Receipt> {
        let content_hash = hex::encode(Sha256::digest(ocr_text.as_bytes()));

        if let Some(existing) = self.get_receipt_by_hash(organization_id, &content_hash)? {
            return Ok(existing);
        }

        let extraction = ocr::extract_receipt(ocr_text);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO receipts (organization_id, ocr_text, extracted_line_items, suggest_split,
                                   detected_total, content_hash)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                organization_id,
                ocr_text,
                serde_json::to_string(&extraction.items)?,
                extraction.suggest_split,
                extraction.detected_total,
                content_hash,
            ],
        )?;
        let id = conn.last_insert_rowid();

        info!(
            receipt_id = id,
            items = extraction.items.len(),
            suggest_split = extraction.suggest_split,
            "Stored receipt"
        );

        self.get_receipt(id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {}", id)))
    }

    pub fn get_receipt(&self, id: i64) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let receipt = conn
            .query_row(
                &format!("SELECT {} FROM receipts WHERE id = ?", RECEIPT_COLUMNS),
                params![id],
                Self::row_to_receipt,
            )
            .optional()?;
        Ok(receipt)
    }

    /// Get receipt by content hash (for deduplication)
    pub fn get_receipt_by_hash(
        &self,
        organization_id: i64,
        content_hash: &str,
    ) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let receipt = conn
            .query_row(
                &format!(
                    "SELECT {} FROM receipts WHERE organization_id = ? AND content_hash = ?",
                    RECEIPT_COLUMNS
                ),
                params![organization_id, content_hash],
                Self::row_to_receipt,
            )
            .optional()?;
        Ok(receipt)
    }

    /// List receipts, newest first
    pub fn list_receipts(&self, organization_id: i64, limit: i64, offset: i64) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM receipts WHERE organization_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            RECEIPT_COLUMNS
        ))?;
        let receipts = stmt
            .query_map(params![organization_id, limit, offset], Self::row_to_receipt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(receipts)
    }

    /// Link a receipt and an expense in both directions
    ///
    /// An expense holds at most one receipt and a receipt belongs to at most
    /// one expense, so any previous link on either side is cleared.
    pub fn attach_receipt(&self, receipt_id: i64, expense_id: i64) -> Result<Receipt> {
        let receipt = self
            .get_receipt(receipt_id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {}", receipt_id)))?;
        let expense = self
            .get_expense(expense_id)?
            .ok_or_else(|| Error::NotFound(format!("Expense {}", expense_id)))?;

        if receipt.organization_id != expense.organization_id {
            return Err(Error::InvalidData(
                "Receipt and expense belong to different organizations".into(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        // Drop whatever either side was linked to before
        tx.execute(
            "UPDATE expenses SET receipt_id = NULL, updated_at = CURRENT_TIMESTAMP
             WHERE receipt_id = ? AND id != ?",
            params![receipt_id, expense_id],
        )?;
        tx.execute(
            "UPDATE receipts SET expense_id = NULL, updated_at = CURRENT_TIMESTAMP
             WHERE expense_id = ? AND id != ?",
            params![expense_id, receipt_id],
        )?;
        tx.execute(
            "UPDATE receipts SET expense_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![expense_id, receipt_id],
        )?;
        tx.execute(
            "UPDATE expenses SET receipt_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![receipt_id, expense_id],
        )?;
        tx.commit()?;

        self.get_receipt(receipt_id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {}", receipt_id)))
    }

    fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<Receipt> {
        let items: String = row.get(4)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(Receipt {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            expense_id: row.get(2)?,
            ocr_text: row.get(3)?,
            extracted_line_items: parse_json_column(4, &items)?,
            suggest_split: row.get(5)?,
            detected_total: row.get(6)?,
            content_hash: row.get(7)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

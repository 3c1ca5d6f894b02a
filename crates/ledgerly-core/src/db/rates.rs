//! Per-diem rate operations

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewPerDiemRate, PerDiemRate, DEFAULT_RATE_LOCATION};

const RATE_COLUMNS: &str = "id, organization_id, location, country_code, lodging_rate, mie_rate,
                            created_at, updated_at";

impl Database {
    /// Insert a rate, or update the existing row for the same (org, location, country)
    ///
    /// Location and country are matched case-insensitively; country codes are
    /// stored upper-cased.
    pub fn upsert_per_diem_rate(&self, rate: &NewPerDiemRate) -> Result<i64> {
        let location = rate.location.trim();
        let country_code = rate.country_code.trim().to_uppercase();

        if location.is_empty() || country_code.is_empty() {
            return Err(Error::InvalidData(
                "Per-diem rate needs a location and a country code".into(),
            ));
        }
        if !(rate.mie_rate >= 0.0 && rate.lodging_rate >= 0.0) {
            return Err(Error::InvalidData("Per-diem rates cannot be negative".into()));
        }

        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM per_diem_rates
                 WHERE organization_id = ? AND lower(location) = lower(?) AND upper(country_code) = ?",
                params![rate.organization_id, location, country_code],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            conn.execute(
                "UPDATE per_diem_rates SET lodging_rate = ?, mie_rate = ?,
                        updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?",
                params![rate.lodging_rate, rate.mie_rate, id],
            )?;
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO per_diem_rates (organization_id, location, country_code, lodging_rate, mie_rate)
             VALUES (?, ?, ?, ?, ?)",
            params![
                rate.organization_id,
                location,
                country_code,
                rate.lodging_rate,
                rate.mie_rate
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_per_diem_rate(&self, id: i64) -> Result<Option<PerDiemRate>> {
        let conn = self.conn()?;
        let rate = conn
            .query_row(
                &format!("SELECT {} FROM per_diem_rates WHERE id = ?", RATE_COLUMNS),
                params![id],
                Self::row_to_per_diem_rate,
            )
            .optional()?;
        Ok(rate)
    }

    /// List an organization's rates, by country then location
    pub fn list_per_diem_rates(&self, organization_id: i64) -> Result<Vec<PerDiemRate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM per_diem_rates WHERE organization_id = ?
             ORDER BY country_code, location",
            RATE_COLUMNS
        ))?;

        let rates = stmt
            .query_map(params![organization_id], Self::row_to_per_diem_rate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rates)
    }

    /// Delete a rate; returns false if it did not exist
    pub fn delete_per_diem_rate(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM per_diem_rates WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Find the rate for a location
    ///
    /// Exact (case-insensitive) location match first, then the country's
    /// default row (location `*`).
    pub fn find_per_diem_rate(
        &self,
        organization_id: i64,
        location: &str,
        country_code: &str,
    ) -> Result<Option<PerDiemRate>> {
        let conn = self.conn()?;
        let country_code = country_code.trim().to_uppercase();

        let rate = conn
            .query_row(
                &format!(
                    "SELECT {} FROM per_diem_rates
                     WHERE organization_id = ?1 AND upper(country_code) = ?2
                       AND (lower(location) = lower(?3) OR location = ?4)
                     ORDER BY CASE WHEN location = ?4 THEN 1 ELSE 0 END
                     LIMIT 1",
                    RATE_COLUMNS
                ),
                params![
                    organization_id,
                    country_code,
                    location.trim(),
                    DEFAULT_RATE_LOCATION
                ],
                Self::row_to_per_diem_rate,
            )
            .optional()?;

        match &rate {
            Some(r) if r.location == DEFAULT_RATE_LOCATION => {
                debug!(location, country_code, "Using country default per-diem rate")
            }
            None => debug!(location, country_code, "No per-diem rate found"),
            _ => {}
        }
        Ok(rate)
    }

    fn row_to_per_diem_rate(row: &rusqlite::Row) -> rusqlite::Result<PerDiemRate> {
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(PerDiemRate {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            location: row.get(2)?,
            country_code: row.get(3)?,
            lodging_rate: row.get(4)?,
            mie_rate: row.get(5)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

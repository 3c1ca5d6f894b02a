//! Travel trip operations
//!
//! A trip owns one day row per calendar day. `total_per_diem` is always
//! recomputed from the day rows inside the same SQLite transaction as the
//! mutation that changed them.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::{parse_date_column, parse_datetime, parse_enum_column, Database};
use crate::error::{Error, Result};
use crate::models::{NewTravelTrip, TravelTrip, TravelTripDay, TripStatus, TripWithDays};
use crate::perdiem::{self, MealsProvided};

const TRIP_COLUMNS: &str = "id, organization_id, user_id, name, location, country_code,
                            start_date, end_date, status, mie_rate, lodging_rate,
                            total_per_diem, created_at, updated_at";

const DAY_COLUMNS: &str = "id, trip_id, date, is_travel_day, breakfast_provided,
                           lunch_provided, dinner_provided, adjusted_mie";

/// Recompute a trip's total from its day rows
fn recompute_total(conn: &rusqlite::Connection, trip_id: i64) -> rusqlite::Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(adjusted_mie), 0) FROM travel_trip_days WHERE trip_id = ?",
        params![trip_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE travel_trips SET total_per_diem = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        params![total, trip_id],
    )?;
    Ok(total)
}

impl Database {
    /// Create a trip at the per-diem rate for its location
    ///
    /// The rate is snapshotted onto the trip so later rate edits don't change
    /// existing trips. One day row is generated per calendar day.
    pub fn create_travel_trip(&self, trip: &NewTravelTrip) -> Result<TripWithDays> {
        if trip.name.trim().is_empty() {
            return Err(Error::InvalidData("Trip name cannot be empty".into()));
        }
        perdiem::check_trip_range(trip.start_date, trip.end_date)?;

        let rate = self
            .find_per_diem_rate(trip.organization_id, &trip.location, &trip.country_code)?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "No per-diem rate for {}, {}",
                    trip.location, trip.country_code
                ))
            })?;

        let plan = perdiem::trip_day_plan(trip.start_date, trip.end_date);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO travel_trips (organization_id, user_id, name, location, country_code,
                                       start_date, end_date, status, mie_rate, lodging_rate)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                trip.organization_id,
                trip.user_id,
                trip.name.trim(),
                trip.location.trim(),
                trip.country_code.trim().to_uppercase(),
                trip.start_date.to_string(),
                trip.end_date.to_string(),
                TripStatus::Planned.as_str(),
                rate.mie_rate,
                rate.lodging_rate,
            ],
        )?;
        let trip_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO travel_trip_days (trip_id, date, is_travel_day, adjusted_mie)
                 VALUES (?, ?, ?, ?)",
            )?;
            for day in &plan {
                let allowance = perdiem::day_allowance(rate.mie_rate, day, MealsProvided::default());
                stmt.execute(params![
                    trip_id,
                    day.date.to_string(),
                    day.is_travel_day,
                    allowance
                ])?;
            }
        }

        let total = recompute_total(&tx, trip_id)?;
        tx.commit()?;

        info!(trip_id, days = plan.len(), total, "Created travel trip");

        self.get_trip_with_days(trip_id)?
            .ok_or_else(|| Error::NotFound(format!("Trip {}", trip_id)))
    }

    pub fn get_travel_trip(&self, id: i64) -> Result<Option<TravelTrip>> {
        let conn = self.conn()?;
        let trip = conn
            .query_row(
                &format!("SELECT {} FROM travel_trips WHERE id = ?", TRIP_COLUMNS),
                params![id],
                Self::row_to_travel_trip,
            )
            .optional()?;
        Ok(trip)
    }

    /// A trip with its days (in date order) and lodging cap
    pub fn get_trip_with_days(&self, id: i64) -> Result<Option<TripWithDays>> {
        let Some(trip) = self.get_travel_trip(id)? else {
            return Ok(None);
        };
        let days = self.list_trip_days(id)?;
        let lodging_cap = perdiem::lodging_cap(trip.lodging_rate, days.len());
        Ok(Some(TripWithDays {
            trip,
            days,
            lodging_cap,
        }))
    }

    pub fn list_trip_days(&self, trip_id: i64) -> Result<Vec<TravelTripDay>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM travel_trip_days WHERE trip_id = ? ORDER BY date",
            DAY_COLUMNS
        ))?;
        let days = stmt
            .query_map(params![trip_id], Self::row_to_trip_day)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(days)
    }

    /// List an organization's trips, newest first
    pub fn list_travel_trips(
        &self,
        organization_id: i64,
        status: Option<TripStatus>,
    ) -> Result<Vec<TravelTrip>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM travel_trips
             WHERE organization_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY start_date DESC, id DESC",
            TRIP_COLUMNS
        ))?;
        let trips = stmt
            .query_map(
                params![organization_id, status.map(|s| s.as_str())],
                Self::row_to_travel_trip,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(trips)
    }

    /// Move a trip through its lifecycle
    pub fn update_trip_status(&self, id: i64, status: TripStatus) -> Result<TravelTrip> {
        let trip = self
            .get_travel_trip(id)?
            .ok_or_else(|| Error::NotFound(format!("Trip {}", id)))?;

        if !trip.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                entity: "trip",
                from: trip.status.to_string(),
                to: status.to_string(),
            });
        }

        let conn = self.conn()?;
        conn.execute(
            "UPDATE travel_trips SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![status.as_str(), id],
        )?;

        info!(trip_id = id, from = %trip.status, to = %status, "Trip status changed");

        self.get_travel_trip(id)?
            .ok_or_else(|| Error::NotFound(format!("Trip {}", id)))
    }

    /// Set which meals were provided on one day and recompute the trip total
    pub fn update_trip_day_meals(
        &self,
        trip_id: i64,
        date: NaiveDate,
        meals: MealsProvided,
    ) -> Result<TripWithDays> {
        let trip = self
            .get_travel_trip(trip_id)?
            .ok_or_else(|| Error::NotFound(format!("Trip {}", trip_id)))?;

        if trip.status.is_terminal() {
            return Err(Error::InvalidData(format!(
                "Trip {} is {} and can no longer be edited",
                trip_id, trip.status
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let is_travel_day: Option<bool> = tx
            .query_row(
                "SELECT is_travel_day FROM travel_trip_days WHERE trip_id = ? AND date = ?",
                params![trip_id, date.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let is_travel_day = is_travel_day
            .ok_or_else(|| Error::NotFound(format!("Trip {} has no day {}", trip_id, date)))?;

        let allowance = perdiem::day_allowance(
            trip.mie_rate,
            &perdiem::DayPlan {
                date,
                is_travel_day,
            },
            meals,
        );

        tx.execute(
            "UPDATE travel_trip_days
             SET breakfast_provided = ?, lunch_provided = ?, dinner_provided = ?, adjusted_mie = ?
             WHERE trip_id = ? AND date = ?",
            params![
                meals.breakfast,
                meals.lunch,
                meals.dinner,
                allowance,
                trip_id,
                date.to_string()
            ],
        )?;
        let total = recompute_total(&tx, trip_id)?;
        tx.commit()?;

        info!(trip_id, %date, allowance, total, "Updated trip day meals");

        self.get_trip_with_days(trip_id)?
            .ok_or_else(|| Error::NotFound(format!("Trip {}", trip_id)))
    }

    fn row_to_travel_trip(row: &rusqlite::Row) -> rusqlite::Result<TravelTrip> {
        let start_date: String = row.get(6)?;
        let end_date: String = row.get(7)?;
        let status: String = row.get(8)?;
        let created_at: String = row.get(12)?;
        let updated_at: String = row.get(13)?;

        Ok(TravelTrip {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            user_id: row.get(2)?,
            name: row.get(3)?,
            location: row.get(4)?,
            country_code: row.get(5)?,
            start_date: parse_date_column(6, &start_date)?,
            end_date: parse_date_column(7, &end_date)?,
            status: parse_enum_column(8, &status)?,
            mie_rate: row.get(9)?,
            lodging_rate: row.get(10)?,
            total_per_diem: row.get(11)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }

    fn row_to_trip_day(row: &rusqlite::Row) -> rusqlite::Result<TravelTripDay> {
        let date: String = row.get(2)?;
        Ok(TravelTripDay {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            date: parse_date_column(2, &date)?,
            is_travel_day: row.get(3)?,
            breakfast_provided: row.get(4)?,
            lunch_provided: row.get(5)?,
            dinner_provided: row.get(6)?,
            adjusted_mie: row.get(7)?,
        })
    }
}

//! Per-diem calculator
//!
//! GSA-style meals and incidental expenses (M&IE) math:
//! - Provided meals are deducted at a fixed share of the full-day M&IE rate
//! - The first and last day of a trip receive 75% of the full-day rate
//! - An adjusted day allowance never goes below zero
//!
//! All amounts are USD floats. Nothing here rounds; callers round for display.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Share of the full-day M&IE rate attributed to breakfast
pub const BREAKFAST_SHARE: f64 = 0.20;
/// Share of the full-day M&IE rate attributed to lunch
pub const LUNCH_SHARE: f64 = 0.25;
/// Share of the full-day M&IE rate attributed to dinner
pub const DINNER_SHARE: f64 = 0.45;
/// Incidentals share; never deducted for provided meals
pub const INCIDENTALS_SHARE: f64 = 0.10;
/// First/last travel day fraction of the full-day rate
pub const TRAVEL_DAY_FRACTION: f64 = 0.75;
/// Longest trip, in calendar days, that trips and estimates accept
pub const MAX_TRIP_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }

    pub fn deduction_fraction(&self) -> f64 {
        match self {
            Self::Breakfast => BREAKFAST_SHARE,
            Self::Lunch => LUNCH_SHARE,
            Self::Dinner => DINNER_SHARE,
        }
    }

    pub fn all() -> &'static [MealType] {
        &[Self::Breakfast, Self::Lunch, Self::Dinner]
    }
}

impl std::str::FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            _ => Err(format!("Unknown meal type: {}", s)),
        }
    }
}

/// Which meals were provided (by a conference, client, hotel, ...)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealsProvided {
    #[serde(default)]
    pub breakfast: bool,
    #[serde(default)]
    pub lunch: bool,
    #[serde(default)]
    pub dinner: bool,
}

impl MealsProvided {
    pub fn is_provided(&self, meal: MealType) -> bool {
        match meal {
            MealType::Breakfast => self.breakfast,
            MealType::Lunch => self.lunch,
            MealType::Dinner => self.dinner,
        }
    }
}

/// Inputs for one day's adjusted allowance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayFlags {
    #[serde(default)]
    pub is_first_or_last_day: bool,
    #[serde(flatten)]
    pub meals: MealsProvided,
}

/// Deduction for one provided meal, always taken from the full-day rate
pub fn meal_deduction(mie_rate: f64, meal: MealType) -> f64 {
    mie_rate * meal.deduction_fraction()
}

/// M&IE for the first or last day of travel
pub fn travel_day_mie(full_rate: f64) -> f64 {
    full_rate * TRAVEL_DAY_FRACTION
}

/// Day allowance after the travel-day reduction and provided-meal deductions
pub fn adjusted_mie(mie_rate: f64, flags: DayFlags) -> f64 {
    let base = if flags.is_first_or_last_day {
        travel_day_mie(mie_rate)
    } else {
        mie_rate
    };

    let deductions: f64 = MealType::all()
        .iter()
        .filter(|meal| flags.meals.is_provided(**meal))
        .map(|meal| meal_deduction(mie_rate, *meal))
        .sum();

    (base - deductions).max(0.0)
}

/// A calendar day of a planned trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub is_travel_day: bool,
}

/// One entry per calendar day from `start` to `end` inclusive
///
/// The first and last days are travel days; a one-day trip's only day is a
/// travel day. An inverted range yields no days.
pub fn trip_day_plan(start: NaiveDate, end: NaiveDate) -> Vec<DayPlan> {
    if end < start {
        return Vec::new();
    }

    let mut days = Vec::new();
    let mut next = Some(start);
    while let Some(date) = next.filter(|d| *d <= end) {
        days.push(DayPlan {
            date,
            is_travel_day: date == start || date == end,
        });
        next = date.succ_opt();
    }
    days
}

/// Number of calendar days from `start` to `end` inclusive
pub fn trip_length_days(start: NaiveDate, end: NaiveDate) -> i64 {
    end.signed_duration_since(start).num_days() + 1
}

/// Reject inverted ranges and trips longer than [`MAX_TRIP_DAYS`]
pub fn check_trip_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        return Err(Error::InvalidData(format!(
            "Trip ends ({}) before it starts ({})",
            end, start
        )));
    }
    let length = trip_length_days(start, end);
    if length > MAX_TRIP_DAYS {
        return Err(Error::InvalidData(format!(
            "Trip spans {} days; the limit is {}",
            length, MAX_TRIP_DAYS
        )));
    }
    Ok(())
}

/// Allowance for one planned day
pub fn day_allowance(mie_rate: f64, day: &DayPlan, meals: MealsProvided) -> f64 {
    adjusted_mie(
        mie_rate,
        DayFlags {
            is_first_or_last_day: day.is_travel_day,
            meals,
        },
    )
}

/// Trip total: the sum of the day allowances, recomputed from scratch
pub fn total_allowance(day_allowances: &[f64]) -> f64 {
    day_allowances.iter().sum()
}

/// Maximum lodging for a trip: one night fewer than the number of days
pub fn lodging_cap(lodging_rate: f64, day_count: usize) -> f64 {
    lodging_rate * day_count.saturating_sub(1) as f64
}

/// Per-day breakdown and total for a trip estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripEstimate {
    pub days: Vec<DayEstimate>,
    pub total_mie: f64,
    pub lodging_cap: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayEstimate {
    pub date: NaiveDate,
    pub is_travel_day: bool,
    pub meals: MealsProvided,
    pub adjusted_mie: f64,
}

/// Estimate a trip's allowance given the meals provided on specific days
///
/// Days not present in `meals_by_date` have no provided meals.
pub fn estimate_trip(
    mie_rate: f64,
    lodging_rate: f64,
    start: NaiveDate,
    end: NaiveDate,
    meals_by_date: &[(NaiveDate, MealsProvided)],
) -> TripEstimate {
    let days: Vec<DayEstimate> = trip_day_plan(start, end)
        .iter()
        .map(|day| {
            let meals = meals_by_date
                .iter()
                .find(|(date, _)| *date == day.date)
                .map(|(_, meals)| *meals)
                .unwrap_or_default();
            DayEstimate {
                date: day.date,
                is_travel_day: day.is_travel_day,
                meals,
                adjusted_mie: day_allowance(mie_rate, day, meals),
            }
        })
        .collect();

    let allowances: Vec<f64> = days.iter().map(|d| d.adjusted_mie).collect();
    let total_mie = total_allowance(&allowances);
    let lodging_cap = lodging_cap(lodging_rate, days.len());

    TripEstimate {
        days,
        total_mie,
        lodging_cap,
    }
}

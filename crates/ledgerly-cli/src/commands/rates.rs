//! Per-diem rate commands and the single-day calculator

use anyhow::{anyhow, Result};
use ledgerly_core::db::Database;
use ledgerly_core::models::{NewPerDiemRate, DEFAULT_RATE_LOCATION};
use ledgerly_core::perdiem::{self, DayFlags, MealType, MealsProvided};

pub fn cmd_rates_list(db: &Database, org: i64) -> Result<()> {
    let rates = db.list_per_diem_rates(org)?;

    if rates.is_empty() {
        println!("No per-diem rates. Add one with:");
        println!("  ledgerly rates set Boston US --lodging 250 --mie 80");
        return Ok(());
    }

    println!();
    println!("🏨 Per-Diem Rates");
    println!("   ─────────────────────────────────────────────────────────────");

    for rate in rates {
        let location = if rate.location == DEFAULT_RATE_LOCATION {
            "(country default)".to_string()
        } else {
            rate.location.clone()
        };
        println!(
            "   [{}] {:<24} {} │ lodging ${:>8.2} │ M&IE ${:>7.2}",
            rate.id, location, rate.country_code, rate.lodging_rate, rate.mie_rate
        );
    }

    Ok(())
}

pub fn cmd_rates_set(
    db: &Database,
    org: i64,
    location: &str,
    country: &str,
    lodging: f64,
    mie: f64,
) -> Result<()> {
    let id = db.upsert_per_diem_rate(&NewPerDiemRate {
        organization_id: org,
        location: location.to_string(),
        country_code: country.to_string(),
        lodging_rate: lodging,
        mie_rate: mie,
    })?;

    println!(
        "✅ Saved rate {} for {}, {}: lodging ${:.2}, M&IE ${:.2}",
        id,
        location,
        country.to_uppercase(),
        lodging,
        mie
    );
    Ok(())
}

pub fn cmd_rates_delete(db: &Database, id: i64) -> Result<()> {
    if !db.delete_per_diem_rate(id)? {
        return Err(anyhow!("Rate {} not found", id));
    }
    println!("✅ Deleted rate {}", id);
    Ok(())
}

pub fn cmd_rates_lookup(db: &Database, org: i64, location: &str, country: &str) -> Result<()> {
    let rate = db
        .find_per_diem_rate(org, location, country)?
        .ok_or_else(|| anyhow!("No per-diem rate for {}, {}", location, country))?;

    if rate.location == DEFAULT_RATE_LOCATION {
        println!(
            "ℹ️  No rate for {}; using the {} country default",
            location, rate.country_code
        );
    }
    println!(
        "   Lodging: ${:.2}/night │ M&IE: ${:.2}/day",
        rate.lodging_rate, rate.mie_rate
    );
    Ok(())
}

pub fn cmd_per_diem(
    rate: f64,
    travel_day: bool,
    breakfast: bool,
    lunch: bool,
    dinner: bool,
) -> Result<()> {
    if rate < 0.0 {
        return Err(anyhow!("M&IE rate cannot be negative"));
    }

    let meals = MealsProvided {
        breakfast,
        lunch,
        dinner,
    };
    let adjusted = perdiem::adjusted_mie(
        rate,
        DayFlags {
            is_first_or_last_day: travel_day,
            meals,
        },
    );

    println!();
    println!("🍽️  Per-Diem Calculation");
    println!("   ─────────────────────────────");
    println!("   Full M&IE rate:  ${:.2}", rate);
    if travel_day {
        println!("   Travel day:      ${:.2} (75%)", perdiem::travel_day_mie(rate));
    }
    for meal in MealType::all() {
        if meals.is_provided(*meal) {
            println!(
                "   - {:<10}      ${:.2}",
                meal.as_str(),
                perdiem::meal_deduction(rate, *meal)
            );
        }
    }
    println!("   Allowance:       ${:.2}", adjusted);

    Ok(())
}

//! Travel trip commands

use anyhow::{anyhow, Result};
use ledgerly_core::db::Database;
use ledgerly_core::models::{NewTravelTrip, TripStatus, TripWithDays};
use ledgerly_core::perdiem::MealsProvided;

use super::parse_date;

pub fn cmd_trips_list(db: &Database, org: i64, status: Option<&str>) -> Result<()> {
    let status: Option<TripStatus> = status
        .map(|s| s.parse().map_err(|e: String| anyhow!(e)))
        .transpose()?;
    let trips = db.list_travel_trips(org, status)?;

    if trips.is_empty() {
        println!("No trips found.");
        return Ok(());
    }

    println!();
    println!("✈️  Trips");
    println!("   ─────────────────────────────────────────────────────────────");

    for trip in trips {
        println!(
            "   [{}] {} → {} │ {:<11} │ {}, {} │ ${:.2} │ {}",
            trip.id,
            trip.start_date,
            trip.end_date,
            trip.status,
            trip.location,
            trip.country_code,
            trip.total_per_diem,
            trip.name
        );
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_trips_create(
    db: &Database,
    org: i64,
    user: &str,
    name: &str,
    location: &str,
    country: &str,
    start: &str,
    end: &str,
) -> Result<()> {
    let trip = db.create_travel_trip(&NewTravelTrip {
        organization_id: org,
        user_id: user.to_string(),
        name: name.to_string(),
        location: location.to_string(),
        country_code: country.to_string(),
        start_date: parse_date(start)?,
        end_date: parse_date(end)?,
    })?;

    println!("✅ Created trip {}", trip.trip.id);
    print_trip(&trip);
    Ok(())
}

pub fn cmd_trips_show(db: &Database, id: i64) -> Result<()> {
    let trip = db
        .get_trip_with_days(id)?
        .ok_or_else(|| anyhow!("Trip {} not found", id))?;
    print_trip(&trip);
    Ok(())
}

pub fn cmd_trips_meals(
    db: &Database,
    id: i64,
    date: &str,
    breakfast: bool,
    lunch: bool,
    dinner: bool,
) -> Result<()> {
    let meals = MealsProvided {
        breakfast,
        lunch,
        dinner,
    };
    let trip = db.update_trip_day_meals(id, parse_date(date)?, meals)?;

    println!("✅ Updated meals for {}", date);
    print_trip(&trip);
    Ok(())
}

pub fn cmd_trips_status(db: &Database, id: i64, status: &str) -> Result<()> {
    let status: TripStatus = status.parse().map_err(|e: String| anyhow!(e))?;
    let trip = db.update_trip_status(id, status)?;
    println!("✅ Trip {} is now {}", trip.id, trip.status);
    Ok(())
}

fn print_trip(detail: &TripWithDays) {
    let trip = &detail.trip;
    println!();
    println!("✈️  {} ({})", trip.name, trip.status);
    println!("   {}, {} │ {} → {}", trip.location, trip.country_code, trip.start_date, trip.end_date);
    println!(
        "   Rates: M&IE ${:.2}/day │ lodging ${:.2}/night",
        trip.mie_rate, trip.lodging_rate
    );
    println!("   ─────────────────────────────────────────────────────────────");

    for day in &detail.days {
        let mut provided = Vec::new();
        if day.breakfast_provided {
            provided.push("B");
        }
        if day.lunch_provided {
            provided.push("L");
        }
        if day.dinner_provided {
            provided.push("D");
        }
        println!(
            "   {} {} │ meals: {:<5} │ ${:>7.2}",
            day.date,
            if day.is_travel_day { "✈" } else { " " },
            provided.join(","),
            day.adjusted_mie
        );
    }

    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Total M&IE:  ${:.2}", trip.total_per_diem);
    println!("   Lodging cap: ${:.2}", detail.lodging_cap);
}

//! Travel trip handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{get_user_email, AppError, AppState};
use ledgerly_core::models::{NewTravelTrip, TravelTrip, TripStatus, TripWithDays};
use ledgerly_core::perdiem::MealsProvided;

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub organization_id: Option<i64>,
    /// Traveller; defaults to the caller
    pub user_id: Option<String>,
    pub name: String,
    pub location: String,
    pub country_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ListTripsQuery {
    pub organization_id: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// POST /api/trips - Create a trip and its per-day allowances
pub async fn create_trip(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTripRequest>,
) -> Result<Json<TripWithDays>, AppError> {
    let user_email = get_user_email(&headers);

    let new_trip = NewTravelTrip {
        organization_id: state.organization_id(req.organization_id),
        user_id: req.user_id.unwrap_or_else(|| user_email.clone()),
        name: req.name,
        location: req.location,
        country_code: req.country_code,
        start_date: req.start_date,
        end_date: req.end_date,
    };

    let trip = state.db.create_travel_trip(&new_trip)?;

    state.db.log_audit(
        &user_email,
        "create",
        Some("trip"),
        Some(trip.trip.id),
        Some(&format!(
            "name={} days={} total={:.2}",
            trip.trip.name,
            trip.days.len(),
            trip.trip.total_per_diem
        )),
    )?;

    Ok(Json(trip))
}

/// GET /api/trips - List trips, optionally by status
pub async fn list_trips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTripsQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<TravelTrip>>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);

    let status = params
        .status
        .as_deref()
        .map(str::parse::<TripStatus>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;

    let trips = state.db.list_travel_trips(org, status)?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("trips"),
        None,
        Some(&format!("count={}", trips.len())),
    )?;

    Ok(Json(trips))
}

/// GET /api/trips/:id - A trip with its days
pub async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<TripWithDays>, AppError> {
    let user_email = get_user_email(&headers);

    let trip = state
        .db
        .get_trip_with_days(id)?
        .ok_or_else(|| AppError::not_found("Trip not found"))?;

    state
        .db
        .log_audit(&user_email, "view", Some("trip"), Some(id), None)?;

    Ok(Json(trip))
}

/// POST /api/trips/:id/status - Move a trip along its lifecycle
pub async fn update_trip_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<TravelTrip>, AppError> {
    let user_email = get_user_email(&headers);

    let status: TripStatus = req
        .status
        .parse()
        .map_err(|e: String| AppError::bad_request(&e))?;
    let trip = state.db.update_trip_status(id, status)?;

    state.db.log_audit(
        &user_email,
        "update_status",
        Some("trip"),
        Some(id),
        Some(&format!("status={}", status)),
    )?;

    Ok(Json(trip))
}

/// PATCH /api/trips/:id/days/:date - Set the meals provided on one day
pub async fn update_trip_day(
    State(state): State<Arc<AppState>>,
    Path((id, date)): Path<(i64, NaiveDate)>,
    headers: HeaderMap,
    Json(meals): Json<MealsProvided>,
) -> Result<Json<TripWithDays>, AppError> {
    let user_email = get_user_email(&headers);

    let trip = state.db.update_trip_day_meals(id, date, meals)?;

    state.db.log_audit(
        &user_email,
        "update_meals",
        Some("trip"),
        Some(id),
        Some(&format!(
            "date={} breakfast={} lunch={} dinner={} total={:.2}",
            date, meals.breakfast, meals.lunch, meals.dinner, trip.trip.total_per_diem
        )),
    )?;

    Ok(Json(trip))
}

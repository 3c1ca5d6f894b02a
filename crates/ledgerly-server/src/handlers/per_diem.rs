//! Per-diem rate and calculation handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{get_user_email, AppError, AppState, SuccessResponse};
use ledgerly_core::models::{NewPerDiemRate, PerDiemRate};
use ledgerly_core::perdiem::{self, DayFlags, MealsProvided, TripEstimate};

#[derive(Debug, Deserialize)]
pub struct OrgQuery {
    pub organization_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertRateRequest {
    pub organization_id: Option<i64>,
    pub location: String,
    pub country_code: String,
    pub lodging_rate: f64,
    pub mie_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub organization_id: Option<i64>,
    pub location: String,
    pub country_code: String,
}

/// Meals provided on one date of an estimated trip
#[derive(Debug, Deserialize)]
pub struct DayMeals {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub meals: MealsProvided,
}

/// Either a single day or a whole date range
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CalculateRequest {
    Trip {
        mie_rate: f64,
        #[serde(default)]
        lodging_rate: f64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        #[serde(default)]
        meals: Vec<DayMeals>,
    },
    Day {
        mie_rate: f64,
        #[serde(flatten)]
        flags: DayFlags,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CalculateResponse {
    Trip(TripEstimate),
    Day { mie_rate: f64, adjusted_mie: f64 },
}

/// GET /api/per-diem/rates - List an organization's rates
pub async fn list_rates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OrgQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<PerDiemRate>>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);

    let rates = state.db.list_per_diem_rates(org)?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("per_diem_rate"),
        None,
        Some(&format!("organization_id={} count={}", org, rates.len())),
    )?;

    Ok(Json(rates))
}

/// POST /api/per-diem/rates - Create or replace a rate
pub async fn upsert_rate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UpsertRateRequest>,
) -> Result<Json<PerDiemRate>, AppError> {
    let user_email = get_user_email(&headers);

    let id = state.db.upsert_per_diem_rate(&NewPerDiemRate {
        organization_id: state.organization_id(req.organization_id),
        location: req.location,
        country_code: req.country_code,
        lodging_rate: req.lodging_rate,
        mie_rate: req.mie_rate,
    })?;
    let rate = state
        .db
        .get_per_diem_rate(id)?
        .ok_or_else(|| AppError::internal("Failed to fetch saved rate"))?;

    state.db.log_audit(
        &user_email,
        "upsert",
        Some("per_diem_rate"),
        Some(id),
        Some(&format!("{}/{}", rate.location, rate.country_code)),
    )?;

    Ok(Json(rate))
}

/// DELETE /api/per-diem/rates/:id
pub async fn delete_rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_email = get_user_email(&headers);

    if !state.db.delete_per_diem_rate(id)? {
        return Err(AppError::not_found("Rate not found"));
    }

    state
        .db
        .log_audit(&user_email, "delete", Some("per_diem_rate"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/per-diem/lookup - Find the rate for a location, with country fallback
pub async fn lookup_rate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupQuery>,
    headers: HeaderMap,
) -> Result<Json<PerDiemRate>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);

    let rate = state
        .db
        .find_per_diem_rate(org, &params.location, &params.country_code)?
        .ok_or_else(|| {
            AppError::not_found(&format!(
                "No per-diem rate for {}, {}",
                params.location, params.country_code
            ))
        })?;

    state.db.log_audit(
        &user_email,
        "lookup",
        Some("per_diem_rate"),
        Some(rate.id),
        Some(&format!("{}/{}", params.location, params.country_code)),
    )?;

    Ok(Json(rate))
}

/// POST /api/per-diem/calculate - One-shot allowance calculation
pub async fn calculate_per_diem(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>, AppError> {
    let user_email = get_user_email(&headers);

    let response = match req {
        CalculateRequest::Trip {
            mie_rate,
            lodging_rate,
            start_date,
            end_date,
            meals,
        } => {
            if !(mie_rate >= 0.0 && lodging_rate >= 0.0) {
                return Err(AppError::bad_request("Rates cannot be negative"));
            }
            perdiem::check_trip_range(start_date, end_date)?;
            let meals: Vec<(NaiveDate, MealsProvided)> =
                meals.into_iter().map(|d| (d.date, d.meals)).collect();
            CalculateResponse::Trip(perdiem::estimate_trip(
                mie_rate,
                lodging_rate,
                start_date,
                end_date,
                &meals,
            ))
        }
        CalculateRequest::Day { mie_rate, flags } => {
            if !(mie_rate >= 0.0) {
                return Err(AppError::bad_request("Rates cannot be negative"));
            }
            CalculateResponse::Day {
                mie_rate,
                adjusted_mie: perdiem::adjusted_mie(mie_rate, flags),
            }
        }
    };

    state
        .db
        .log_audit(&user_email, "calculate", Some("per_diem"), None, None)?;

    Ok(Json(response))
}

//! Expense handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{get_user_email, AppError, AppState};
use ledgerly_core::models::{Expense, NewExpense};

#[derive(Debug, Deserialize)]
pub struct ListExpensesQuery {
    pub organization_id: Option<i64>,
    pub user_id: Option<String>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub organization_id: Option<i64>,
    /// Owner; defaults to the caller
    pub user_id: Option<String>,
    pub date: NaiveDate,
    pub merchant: String,
    pub amount: f64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub receipt_id: Option<i64>,
}

/// GET /api/expenses - List expenses, optionally for one user
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListExpensesQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Expense>>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);
    let limit = state.app_config.page_limit(params.limit);

    let expenses = state.db.list_expenses(
        org,
        params.user_id.as_deref(),
        limit,
        params.offset.max(0),
    )?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("expenses"),
        None,
        Some(&format!("count={}", expenses.len())),
    )?;

    Ok(Json(expenses))
}

/// POST /api/expenses - Record an expense
pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<Json<Expense>, AppError> {
    let user_email = get_user_email(&headers);

    let id = state.db.create_expense(&NewExpense {
        organization_id: state.organization_id(req.organization_id),
        user_id: req.user_id.unwrap_or_else(|| user_email.clone()),
        date: req.date,
        merchant: req.merchant,
        amount: req.amount,
        category: req.category,
        description: req.description,
        receipt_id: req.receipt_id,
        transaction_id: None,
    })?;
    let expense = state
        .db
        .get_expense(id)?
        .ok_or_else(|| AppError::internal("Failed to fetch created expense"))?;

    state.db.log_audit(
        &user_email,
        "create",
        Some("expense"),
        Some(id),
        Some(&format!("amount={:.2}", expense.amount)),
    )?;

    Ok(Json(expense))
}

/// GET /api/expenses/:id
pub async fn get_expense(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Expense>, AppError> {
    let user_email = get_user_email(&headers);

    let expense = state
        .db
        .get_expense(id)?
        .ok_or_else(|| AppError::not_found("Expense not found"))?;

    state
        .db
        .log_audit(&user_email, "view", Some("expense"), Some(id), None)?;

    Ok(Json(expense))
}

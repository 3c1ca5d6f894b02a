//! Expense policy handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{get_user_email, AppError, AppState, SuccessResponse};
use ledgerly_core::models::{ExpensePolicy, NewExpensePolicy, PolicyScope};
use ledgerly_core::policy::{self, EffectivePolicy, ExpenseDraft, PolicyCheck, PolicySubject};

#[derive(Debug, Deserialize)]
pub struct ListPoliciesQuery {
    pub organization_id: Option<i64>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePolicyRequest {
    pub organization_id: Option<i64>,
    pub name: String,
    pub scope: Option<PolicyScope>,
    pub scope_value: Option<String>,
    pub max_amount: Option<f64>,
    pub max_daily_total: Option<f64>,
    pub max_monthly_total: Option<f64>,
    pub max_receipt_age_days: Option<i64>,
    pub receipt_required: Option<bool>,
    pub description_required: Option<bool>,
    pub weekends_allowed: Option<bool>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    100
}

#[derive(Debug, Deserialize)]
pub struct EffectiveQuery {
    pub organization_id: Option<i64>,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub organization_id: Option<i64>,
    /// Submitter; defaults to the caller
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    /// Evaluation date; defaults to today
    pub today: Option<NaiveDate>,
    #[serde(flatten)]
    pub draft: ExpenseDraft,
}

/// GET /api/policies
pub async fn list_policies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListPoliciesQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<ExpensePolicy>>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);

    let policies = state.db.list_expense_policies(org, params.active_only)?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("policies"),
        None,
        Some(&format!("count={}", policies.len())),
    )?;

    Ok(Json(policies))
}

/// POST /api/policies
pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreatePolicyRequest>,
) -> Result<Json<ExpensePolicy>, AppError> {
    let user_email = get_user_email(&headers);

    let new_policy = NewExpensePolicy {
        organization_id: state.organization_id(req.organization_id),
        name: req.name,
        scope: req.scope,
        scope_value: req.scope_value,
        max_amount: req.max_amount,
        max_daily_total: req.max_daily_total,
        max_monthly_total: req.max_monthly_total,
        max_receipt_age_days: req.max_receipt_age_days,
        receipt_required: req.receipt_required,
        description_required: req.description_required,
        weekends_allowed: req.weekends_allowed,
        priority: req.priority,
    };
    let id = state.db.create_expense_policy(&new_policy)?;
    let policy = state
        .db
        .get_expense_policy(id)?
        .ok_or_else(|| AppError::internal("Failed to fetch created policy"))?;

    state.db.log_audit(
        &user_email,
        "create",
        Some("policy"),
        Some(id),
        Some(&format!("name={} scope={}", policy.name, policy.scope)),
    )?;

    Ok(Json(policy))
}

/// DELETE /api/policies/:id
pub async fn delete_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_email = get_user_email(&headers);

    if !state.db.delete_expense_policy(id)? {
        return Err(AppError::not_found("Policy not found"));
    }

    state
        .db
        .log_audit(&user_email, "delete", Some("policy"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/policies/effective - The merged policy for a subject
pub async fn get_effective_policy(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EffectiveQuery>,
    headers: HeaderMap,
) -> Result<Json<EffectivePolicy>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);

    let subject = PolicySubject {
        user_id: params.user_id,
        role: params.role,
        department: params.department,
        category: params.category,
    };

    let policies = state.db.list_expense_policies(org, true)?;
    let effective = policy::effective_policy(&policies, &subject);

    state.db.log_audit(
        &user_email,
        "effective",
        Some("policies"),
        None,
        Some(&format!("sources={:?}", effective.source_policy_ids)),
    )?;

    Ok(Json(effective))
}

/// POST /api/policies/evaluate - Check a draft expense against policy
pub async fn evaluate_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<PolicyCheck>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(req.organization_id);
    let user_id = req.user_id.unwrap_or_else(|| user_email.clone());
    let today = req
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let subject = PolicySubject {
        user_id: Some(user_id.clone()),
        role: req.role,
        department: req.department,
        category: req.draft.category.clone(),
    };

    let check = policy::check_expense(
        &state.db,
        org,
        &user_id,
        &subject,
        &req.draft,
        today,
        state.app_config.approaching_limit_ratio,
    )?;

    state.db.log_audit(
        &user_email,
        "evaluate",
        Some("policies"),
        None,
        Some(&format!(
            "amount={:.2} result={}",
            req.draft.amount,
            check.report.summary()
        )),
    )?;

    Ok(Json(check))
}

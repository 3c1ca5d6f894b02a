//! Transaction rule handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{get_user_email, AppError, AppState, SuccessResponse};
use ledgerly_core::models::{
    NewTransactionRule, RuleAction, RuleCriteria, TransactionRule, TransactionRuleUpdate,
};
use ledgerly_core::rules::{self, MatchInput, RuleOutcome};

#[derive(Debug, Deserialize)]
pub struct ListRulesQuery {
    pub organization_id: Option<i64>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub organization_id: Option<i64>,
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub criteria: RuleCriteria,
    pub action: RuleAction,
}

fn default_priority() -> i32 {
    100
}

/// A sample transaction to run the rule table against
#[derive(Debug, Deserialize)]
pub struct TestRulesRequest {
    pub organization_id: Option<i64>,
    pub description: String,
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct TestRulesResponse {
    /// What would happen to the transaction
    pub outcome: Option<RuleOutcome>,
    /// Every active rule that matches, in evaluation order
    pub matching_rules: Vec<TransactionRule>,
}

/// GET /api/rules - List rules in evaluation order
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListRulesQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<TransactionRule>>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);

    let rules = state.db.list_transaction_rules(org, params.active_only)?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("rules"),
        None,
        Some(&format!("count={}", rules.len())),
    )?;

    Ok(Json(rules))
}

/// POST /api/rules - Create a rule
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateRuleRequest>,
) -> Result<Json<TransactionRule>, AppError> {
    let user_email = get_user_email(&headers);

    let id = state.db.create_transaction_rule(&NewTransactionRule {
        organization_id: state.organization_id(req.organization_id),
        name: req.name,
        priority: req.priority,
        criteria: req.criteria,
        action: req.action,
    })?;
    let rule = state
        .db
        .get_transaction_rule(id)?
        .ok_or_else(|| AppError::internal("Failed to fetch created rule"))?;

    state.db.log_audit(
        &user_email,
        "create",
        Some("rule"),
        Some(id),
        Some(&format!(
            "name={} priority={} action={}",
            rule.name,
            rule.priority,
            rule.action.as_str()
        )),
    )?;

    Ok(Json(rule))
}

/// GET /api/rules/:id
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<TransactionRule>, AppError> {
    let user_email = get_user_email(&headers);

    let rule = state
        .db
        .get_transaction_rule(id)?
        .ok_or_else(|| AppError::not_found("Rule not found"))?;

    state
        .db
        .log_audit(&user_email, "view", Some("rule"), Some(id), None)?;

    Ok(Json(rule))
}

/// PATCH /api/rules/:id - Partial update (name, priority, active flag, criteria, action)
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(update): Json<TransactionRuleUpdate>,
) -> Result<Json<TransactionRule>, AppError> {
    let user_email = get_user_email(&headers);

    let rule = state.db.update_transaction_rule(id, &update)?;

    state.db.log_audit(
        &user_email,
        "update",
        Some("rule"),
        Some(id),
        Some(&format!(
            "priority={} is_active={}",
            rule.priority, rule.is_active
        )),
    )?;

    Ok(Json(rule))
}

/// DELETE /api/rules/:id
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_email = get_user_email(&headers);

    if !state.db.delete_transaction_rule(id)? {
        return Err(AppError::not_found("Rule not found"));
    }

    state
        .db
        .log_audit(&user_email, "delete", Some("rule"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/rules/test - Dry-run the rule table against a sample transaction
pub async fn test_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TestRulesRequest>,
) -> Result<Json<TestRulesResponse>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(req.organization_id);

    let all_rules = state.db.list_transaction_rules(org, true)?;
    let input = MatchInput {
        description: &req.description,
        merchant_name: req.merchant_name.as_deref(),
        provider_categories: &req.categories,
        amount: req.amount,
    };

    let outcome = rules::evaluate(&all_rules, &input);
    let matching_rules = rules::explain_rules(&all_rules, &input)
        .into_iter()
        .cloned()
        .collect();

    state.db.log_audit(
        &user_email,
        "test",
        Some("rules"),
        outcome.as_ref().map(|o| o.rule_id),
        Some(&format!("description={}", req.description)),
    )?;

    Ok(Json(TestRulesResponse {
        outcome,
        matching_rules,
    }))
}

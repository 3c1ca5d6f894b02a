//! Imported transaction handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{get_user_email, AppError, AppState};
use ledgerly_core::import::{self, ImportFormat, ImportSummary};
use ledgerly_core::models::{Expense, ImportedTransaction, TransactionStatus};
use ledgerly_core::{ApplyRulesSummary, RuleEngine, RuleOutcome};

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub organization_id: Option<i64>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<ImportedTransaction>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub organization_id: Option<i64>,
    /// `csv` or `plaid`; detected from the body when absent
    pub format: Option<String>,
    #[serde(default = "default_apply_rules")]
    pub apply_rules: bool,
}

fn default_apply_rules() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ApplyRulesQuery {
    pub organization_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConvertRequest {
    /// Expense owner; defaults to the caller
    pub user_id: Option<String>,
    /// Overrides the rule-assigned category
    pub category: Option<String>,
}

/// GET /api/transactions - List imported transactions with pagination
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTransactionsQuery>,
    headers: HeaderMap,
) -> Result<Json<TransactionListResponse>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);
    let limit = state.app_config.page_limit(params.limit);
    let offset = params.offset.max(0);

    let status = params
        .status
        .as_deref()
        .map(str::parse::<TransactionStatus>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;

    let transactions = state
        .db
        .list_imported_transactions(org, status, limit, offset)?;
    let total = state.db.count_imported_transactions(org, status)?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("transactions"),
        None,
        Some(&format!(
            "limit={} offset={} count={}",
            limit,
            offset,
            transactions.len()
        )),
    )?;

    Ok(Json(TransactionListResponse {
        transactions,
        total,
    }))
}

/// POST /api/transactions/import - Import a CSV or Plaid JSON body
pub async fn import_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImportQuery>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ImportSummary>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);

    if body.trim().is_empty() {
        return Err(AppError::bad_request("Import body is empty"));
    }

    let format = match params.format.as_deref() {
        Some(f) => f
            .parse::<ImportFormat>()
            .map_err(|e| AppError::bad_request(&e))?,
        None => ImportFormat::detect(None, &body),
    };

    let summary =
        import::import_transactions(&state.db, org, body.as_bytes(), format, params.apply_rules)?;

    state.db.log_audit(
        &user_email,
        "import",
        Some("transactions"),
        None,
        Some(&format!(
            "format={} parsed={} inserted={} duplicates={}",
            format, summary.parsed, summary.inserted, summary.duplicates
        )),
    )?;

    Ok(Json(summary))
}

/// POST /api/transactions/apply-rules - Run rules over every new transaction
pub async fn apply_rules(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ApplyRulesQuery>,
    headers: HeaderMap,
) -> Result<Json<ApplyRulesSummary>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);

    let summary = RuleEngine::new(&state.db).apply_rules_to_new(org)?;

    state.db.log_audit(
        &user_email,
        "apply_rules",
        Some("transactions"),
        None,
        Some(&format!(
            "processed={} matched={} ignored={} unmatched={}",
            summary.processed, summary.matched, summary.ignored, summary.unmatched
        )),
    )?;

    Ok(Json(summary))
}

/// POST /api/transactions/:id/ignore
pub async fn ignore_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ImportedTransaction>, AppError> {
    let user_email = get_user_email(&headers);

    let tx = state.db.ignore_transaction(id)?;

    state
        .db
        .log_audit(&user_email, "ignore", Some("transaction"), Some(id), None)?;

    Ok(Json(tx))
}

#[derive(Debug, Serialize)]
pub struct ReclassifyResponse {
    pub transaction: ImportedTransaction,
    pub outcome: Option<RuleOutcome>,
}

/// POST /api/transactions/:id/reclassify - Reset a matched transaction and rerun rules
pub async fn reclassify_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ReclassifyResponse>, AppError> {
    let user_email = get_user_email(&headers);

    let (transaction, outcome) = RuleEngine::new(&state.db).reclassify(id)?;

    state.db.log_audit(
        &user_email,
        "reclassify",
        Some("transaction"),
        Some(id),
        outcome
            .as_ref()
            .map(|o| format!("rule={}", o.rule_id))
            .as_deref(),
    )?;

    Ok(Json(ReclassifyResponse {
        transaction,
        outcome,
    }))
}

/// POST /api/transactions/:id/convert - Turn a transaction into an expense
pub async fn convert_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Option<Json<ConvertRequest>>,
) -> Result<Json<Expense>, AppError> {
    let user_email = get_user_email(&headers);
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let user_id = req.user_id.unwrap_or_else(|| user_email.clone());

    let expense = state
        .db
        .convert_transaction_to_expense(id, &user_id, req.category.as_deref())?;

    state.db.log_audit(
        &user_email,
        "convert",
        Some("transaction"),
        Some(id),
        Some(&format!("expense_id={}", expense.id)),
    )?;

    Ok(Json(expense))
}

//! Receipt handlers
//!
//! Receipts arrive as OCR text; the image-to-text step happens upstream.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{get_user_email, AppError, AppState};
use ledgerly_core::models::Receipt;
use ledgerly_core::ocr::{self, ReceiptExtraction};

#[derive(Debug, Deserialize)]
pub struct ListReceiptsQuery {
    pub organization_id: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateReceiptRequest {
    pub organization_id: Option<i64>,
    pub ocr_text: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub ocr_text: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub expense_id: i64,
}

/// GET /api/receipts - List receipts, newest first
pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListReceiptsQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(params.organization_id);
    let limit = state.app_config.page_limit(params.limit);

    let receipts = state.db.list_receipts(org, limit, params.offset.max(0))?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("receipts"),
        None,
        Some(&format!("count={}", receipts.len())),
    )?;

    Ok(Json(receipts))
}

/// POST /api/receipts - Store OCR text with its extracted line items
pub async fn create_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateReceiptRequest>,
) -> Result<Json<Receipt>, AppError> {
    let user_email = get_user_email(&headers);
    let org = state.organization_id(req.organization_id);

    if req.ocr_text.trim().is_empty() {
        return Err(AppError::bad_request("ocr_text is empty"));
    }

    let receipt = state.db.create_receipt_from_ocr(org, &req.ocr_text)?;

    state.db.log_audit(
        &user_email,
        "create",
        Some("receipt"),
        Some(receipt.id),
        Some(&format!(
            "items={} suggest_split={}",
            receipt.extracted_line_items.len(),
            receipt.suggest_split
        )),
    )?;

    Ok(Json(receipt))
}

/// POST /api/receipts/extract - Extract line items without storing anything
pub async fn extract_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ReceiptExtraction>, AppError> {
    let user_email = get_user_email(&headers);

    let extraction = ocr::extract_receipt(&req.ocr_text);

    state.db.log_audit(
        &user_email,
        "extract",
        Some("receipt"),
        None,
        Some(&format!("items={}", extraction.items.len())),
    )?;

    Ok(Json(extraction))
}

/// GET /api/receipts/:id
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Receipt>, AppError> {
    let user_email = get_user_email(&headers);

    let receipt = state
        .db
        .get_receipt(id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    state
        .db
        .log_audit(&user_email, "view", Some("receipt"), Some(id), None)?;

    Ok(Json(receipt))
}

/// POST /api/receipts/:id/attach - Link a receipt to an expense
pub async fn attach_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<AttachRequest>,
) -> Result<Json<Receipt>, AppError> {
    let user_email = get_user_email(&headers);

    let receipt = state.db.attach_receipt(id, req.expense_id)?;

    state.db.log_audit(
        &user_email,
        "attach",
        Some("receipt"),
        Some(id),
        Some(&format!("expense_id={}", req.expense_id)),
    )?;

    Ok(Json(receipt))
}

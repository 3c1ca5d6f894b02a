//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use ledgerly_core::db::Database;
use ledgerly_core::models::NewPerDiemRate;
use tower::ServiceExt;

fn test_config() -> ServerConfig {
    ServerConfig {
        require_auth: false,
        allowed_origins: vec![],
        ..Default::default()
    }
}

fn setup_test_app() -> Router {
    let db = Database::in_memory().unwrap();
    create_router(db, test_config(), AppConfig::default())
}

fn setup_test_app_with_db() -> (Router, Database) {
    let db = Database::in_memory().unwrap();
    let app = create_router(db.clone(), test_config(), AppConfig::default());
    (app, db)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-email", "alice@example.com")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-email", "alice@example.com")
        .body(Body::empty())
        .unwrap()
}

fn seed_rate(db: &Database) {
    db.upsert_per_diem_rate(&NewPerDiemRate {
        organization_id: 1,
        location: "Boston".into(),
        country_code: "US".into(),
        lodging_rate: 250.0,
        mie_rate: 80.0,
    })
    .unwrap();
}

// ========== Auth Tests ==========

#[tokio::test]
async fn test_auth_required_by_default() {
    let db = Database::in_memory().unwrap();
    let config = ServerConfig {
        api_keys: vec!["secret-key".into()],
        ..Default::default()
    };
    let app = create_router(db, config, AppConfig::default());

    let response = app
        .clone()
        .oneshot(get_request("/api/rules"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/rules")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/rules")
                .header("authorization", "Bearer secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn test_validate_api_key() {
    let keys = vec!["abc123".to_string(), "other".to_string()];
    assert!(validate_api_key("abc123", &keys));
    assert!(validate_api_key("other", &keys));
    assert!(!validate_api_key("abc124", &keys));
    assert!(!validate_api_key("abc", &keys));
    assert!(!validate_api_key("anything", &[]));
}

#[test]
fn test_parse_api_keys() {
    assert_eq!(parse_api_keys(" a , b,,c "), vec!["a", "b", "c"]);
    assert!(parse_api_keys("").is_empty());
}

#[test]
fn test_get_user_email() {
    let mut headers = axum::http::HeaderMap::new();
    assert_eq!(get_user_email(&headers), "local-dev");

    headers.insert("authorization", "Bearer key".parse().unwrap());
    assert_eq!(get_user_email(&headers), "api-key");

    headers.insert("x-user-email", "bob@example.com".parse().unwrap());
    assert_eq!(get_user_email(&headers), "bob@example.com");
}

#[tokio::test]
async fn test_security_headers() {
    let app = setup_test_app();

    let response = app.oneshot(get_request("/api/audit")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

// ========== Per-Diem API Tests ==========

#[tokio::test]
async fn test_rate_upsert_and_lookup() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/per-diem/rates",
            serde_json::json!({
                "location": "*",
                "country_code": "us",
                "lodging_rate": 110.0,
                "mie_rate": 68.0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["country_code"], "US");

    // Unknown city falls back to the country default
    let response = app
        .clone()
        .oneshot(get_request(
            "/api/per-diem/lookup?location=Dayton&country_code=US",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["mie_rate"], 68.0);

    let response = app
        .oneshot(get_request(
            "/api/per-diem/lookup?location=Paris&country_code=FR",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_calculate_single_day() {
    let app = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/per-diem/calculate",
            serde_json::json!({
                "mie_rate": 80.0,
                "is_first_or_last_day": true,
                "breakfast": true
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    // 80 * 0.75 - 80 * 0.20
    assert_eq!(json["adjusted_mie"], 44.0);
}

#[tokio::test]
async fn test_calculate_trip_estimate() {
    let app = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/per-diem/calculate",
            serde_json::json!({
                "mie_rate": 80.0,
                "lodging_rate": 200.0,
                "start_date": "2024-05-01",
                "end_date": "2024-05-03",
                "meals": [{ "date": "2024-05-02", "dinner": true }]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["days"].as_array().unwrap().len(), 3);
    assert_eq!(json["total_mie"], 164.0);
    assert_eq!(json["lodging_cap"], 400.0);
}

#[tokio::test]
async fn test_calculate_rejects_overlong_trip() {
    let app = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/per-diem/calculate",
            serde_json::json!({
                "mie_rate": 80.0,
                "lodging_rate": 200.0,
                "start_date": "0001-01-01",
                "end_date": "9999-12-31",
                "meals": []
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Trip API Tests ==========

#[tokio::test]
async fn test_trip_lifecycle() {
    let (app, db) = setup_test_app_with_db();
    seed_rate(&db);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/trips",
            serde_json::json!({
                "name": "Customer onsite",
                "location": "boston",
                "country_code": "US",
                "start_date": "2024-05-01",
                "end_date": "2024-05-03"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let id = json["id"].as_i64().unwrap();
    assert_eq!(json["user_id"], "alice@example.com");
    assert_eq!(json["total_per_diem"], 200.0);
    assert_eq!(json["days"].as_array().unwrap().len(), 3);

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/trips/{}/days/2024-05-02", id),
            serde_json::json!({ "lunch": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["total_per_diem"], 180.0);

    // planned -> completed skips in_progress
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/trips/{}/status", id),
            serde_json::json!({ "status": "completed" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/trips/{}/status", id),
            serde_json::json!({ "status": "cancelled" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/api/trips?status=cancelled"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_trip_without_rate() {
    let app = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/trips",
            serde_json::json!({
                "name": "Nowhere",
                "location": "Atlantis",
                "country_code": "XX",
                "start_date": "2024-05-01",
                "end_date": "2024-05-02"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Rule & Transaction API Tests ==========

async fn create_rideshare_rule(app: &Router) -> i64 {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/rules",
            serde_json::json!({
                "name": "Rideshare",
                "priority": 10,
                "criteria": { "merchant_contains": ["uber", "lyft"] },
                "action": { "type": "set_category", "category": "Ground Transportation" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    get_body_json(response).await["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_rule_crud() {
    let app = setup_test_app();
    let id = create_rideshare_rule(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/rules/{}", id),
            serde_json::json!({ "is_active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["is_active"], false);

    let response = app
        .clone()
        .oneshot(get_request("/api/rules?active_only=true"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert!(json.as_array().unwrap().is_empty());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/rules/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!("/api/rules/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_invalid_rule() {
    let app = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/rules",
            serde_json::json!({
                "name": "Backwards",
                "criteria": { "amount_min": 100.0, "amount_max": 10.0 },
                "action": { "type": "ignore" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rules_dry_run() {
    let app = setup_test_app();
    let id = create_rideshare_rule(&app).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/rules/test",
            serde_json::json!({ "description": "UBER *TRIP", "amount": -12.5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["outcome"]["rule_id"], id);
    assert_eq!(json["outcome"]["status"], "matched");
    assert_eq!(json["matching_rules"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_import_and_convert() {
    let app = setup_test_app();
    create_rideshare_rule(&app).await;

    let csv = "Date,Description,Amount\n\
               2024-03-04,UBER TRIP,-31.20\n\
               2024-03-05,CORNER DELI,-9.75\n";

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/transactions/import")
                .header("content-type", "text/csv")
                .body(Body::from(csv))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["format"], "csv");
    assert_eq!(json["inserted"], 2);
    assert_eq!(json["rules"]["matched"], 1);
    assert_eq!(json["rules"]["unmatched"], 1);

    // Same file again is all duplicates
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/transactions/import?format=csv")
                .body(Body::from(csv))
                .unwrap(),
        )
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["duplicates"], 2);

    let response = app
        .clone()
        .oneshot(get_request("/api/transactions?status=matched"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 1);
    let tx_id = json["transactions"][0]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/transactions/{}/convert", tx_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["amount"], 31.2);
    assert_eq!(json["user_id"], "alice@example.com");
    assert_eq!(json["category"], "Ground Transportation");

    // Converted is terminal
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/transactions/{}/ignore", tx_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reclassify_transaction() {
    let app = setup_test_app();
    let rule_id = create_rideshare_rule(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/transactions/import?format=csv")
                .body(Body::from("Date,Description,Amount\n2024-03-04,UBER TRIP,-18.00\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/api/transactions?status=matched"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    let tx_id = json["transactions"][0]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/transactions/{}/reclassify", tx_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["outcome"]["rule_id"], rule_id);
    assert_eq!(json["transaction"]["status"], "matched");

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/transactions/9999/reclassify",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_import_rejects_unknown_format() {
    let app = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/transactions/import?format=ofx")
                .body(Body::from("<OFX>"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transactions_invalid_status() {
    let app = setup_test_app();

    let response = app
        .oneshot(get_request("/api/transactions?status=bogus"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Receipt API Tests ==========

#[tokio::test]
async fn test_extract_receipt() {
    let app = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/receipts/extract",
            serde_json::json!({
                "ocr_text": "Unleaded gallons 45.10\nCoffee 2.75\nSUBTOTAL 47.85\nTOTAL 47.85"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
    assert_eq!(json["suggest_split"], true);
    assert_eq!(json["detected_total"], 47.85);
    assert_eq!(json["splits"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_receipt_attach_flow() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            serde_json::json!({ "ocr_text": "Hotel room 189.00\nTOTAL 189.00" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipt_id = get_body_json(response).await["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/expenses",
            serde_json::json!({
                "date": "2024-03-05",
                "merchant": "Marriott",
                "amount": 189.0,
                "category": "Lodging"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let expense_id = get_body_json(response).await["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/attach", receipt_id),
            serde_json::json!({ "expense_id": expense_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!("/api/expenses/{}", expense_id)))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["receipt_id"], receipt_id);
}

#[tokio::test]
async fn test_create_receipt_requires_text() {
    let app = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            serde_json::json!({ "ocr_text": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Policy API Tests ==========

#[tokio::test]
async fn test_policy_effective_and_evaluate() {
    let app = setup_test_app();

    for body in [
        serde_json::json!({
            "name": "Company",
            "max_amount": 500.0,
            "receipt_required": true,
            "weekends_allowed": false
        }),
        serde_json::json!({
            "name": "Engineering meals",
            "scope": "department",
            "scope_value": "engineering",
            "max_amount": 75.0,
            "priority": 10
        }),
    ] {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/policies", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get_request("/api/policies/effective?department=Engineering"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["max_amount"], 75.0);
    assert_eq!(json["receipt_required"], true);
    assert_eq!(json["source_policy_ids"].as_array().unwrap().len(), 2);

    // Saturday, over the department limit, no receipt
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/policies/evaluate",
            serde_json::json!({
                "department": "engineering",
                "today": "2024-03-20",
                "amount": 80.0,
                "date": "2024-03-16",
                "category": "Meals"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let codes: Vec<&str> = json["violations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["code"].as_str().unwrap())
        .collect();
    assert_eq!(
        codes,
        vec!["amount_exceeded", "receipt_missing", "weekend_not_allowed"]
    );
    assert!(json["warnings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_scoped_policy_requires_value() {
    let app = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/policies",
            serde_json::json!({ "name": "Role cap", "scope": "role", "max_amount": 50.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Audit API Tests ==========

#[tokio::test]
async fn test_requests_are_audited() {
    let app = setup_test_app();

    app.clone()
        .oneshot(get_request("/api/rules"))
        .await
        .unwrap();

    let response = app.oneshot(get_request("/api/audit")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let entries = json.as_array().unwrap();
    assert!(entries
        .iter()
        .any(|e| e["entity_type"] == "rules" && e["user_email"] == "alice@example.com"));
}

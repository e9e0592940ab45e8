use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use surge_api::{app, AppState};
use surge_store::InMemoryPricingRepository;
use surge_strategy::{PricingService, StrategyCache};
use tower::ServiceExt;

fn test_app() -> Router {
    let repo = Arc::new(InMemoryPricingRepository::new());
    let service = PricingService::new(repo).with_cache(Arc::new(StrategyCache::new()));
    app(AppState::new(service))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_calculate_then_latest() {
    let app = test_app();

    let (status, price) = send(
        &app,
        post_json(
            "/v1/prices/calculate",
            json!({
                "sku_id": "sku-42",
                "base_price": 100.0,
                "current_stock": 20,
                "total_stock": 100,
                "daily_demand": 150.0,
                "average_daily_demand": 100.0,
                "user_level": "vip"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(price["sku_id"], "sku-42");
    assert_eq!(price["strategy_type"], "dynamic");
    let final_price = price["final_price"].as_f64().unwrap();
    assert!((50.0..=200.0).contains(&final_price));

    let (status, latest) = send(&app, get("/v1/prices/sku-42/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["id"], price["id"]);
    assert_eq!(latest["final_price"], price["final_price"]);
    assert_eq!(latest["is_valid"], true);
}

#[tokio::test]
async fn test_latest_for_unknown_sku_is_not_found() {
    let app = test_app();
    let (status, body) = send(&app, get("/v1/prices/missing/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_calculate_rejects_bad_input() {
    let app = test_app();

    let (status, _) = send(
        &app,
        post_json("/v1/prices/calculate", json!({ "sku_id": "  ", "base_price": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json("/v1/prices/calculate", json!({ "sku_id": "sku-1", "base_price": -1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_save_and_list_strategies() {
    let app = test_app();

    let (status, saved) = send(
        &app,
        post_json(
            "/v1/strategies",
            json!({
                "sku_id": "sku-fixed",
                "strategy_type": "fixed",
                "min_price": 80.0,
                "max_price": 90.0
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(saved["id"].is_string());
    assert_eq!(saved["enabled"], true);

    let (status, list) = send(&app, get("/v1/strategies?page=1&page_size=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["page"], 1);
    assert_eq!(list["page_size"], 20);
    assert_eq!(list["items"][0]["sku_id"], "sku-fixed");

    // Fixed strategy clamps the base into the stored bounds
    let (status, price) = send(
        &app,
        post_json("/v1/prices/calculate", json!({ "sku_id": "sku-fixed", "base_price": 100.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(price["strategy_type"], "fixed");
    assert_eq!(price["final_price"].as_f64().unwrap(), 90.0);
}

#[tokio::test]
async fn test_save_strategy_with_inverted_bounds_is_rejected() {
    let app = test_app();

    let (status, body) = send(
        &app,
        post_json(
            "/v1/strategies",
            json!({ "sku_id": "sku-bad", "min_price": 200.0, "max_price": 100.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (_, list) = send(&app, get("/v1/strategies")).await;
    assert_eq!(list["total"], 0);
}
